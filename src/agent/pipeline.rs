//! Pipeline trace
//!
//! Records every external call made while producing a reply, in order, for
//! diagnostic replay. Steps can only be appended.

use std::time::Duration;

use tracing::debug;

use crate::core::PipelineStep;

/// Append-only record of the calls made during one turn
#[derive(Debug, Clone, Default)]
pub struct PipelineTrace {
    steps: Vec<PipelineStep>,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn record(
        &mut self,
        stage: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        duration: Option<Duration>,
    ) {
        let step = PipelineStep {
            stage: stage.into(),
            input: input.into(),
            output: output.into(),
            duration_ms: duration.map(|d| d.as_millis() as u64),
        };
        debug!(
            stage = %step.stage,
            duration_ms = ?step.duration_ms,
            output_len = step.output.len(),
            "pipeline step"
        );
        self.steps.push(step);
    }

    /// Append every step of another trace, keeping their order
    pub fn extend(&mut self, other: PipelineTrace) {
        self.steps.extend(other.steps);
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<PipelineStep> {
        self.steps
    }
}
