//! Tool loop state
//!
//! Tracks the rounds of tool calls within one agent turn and the results
//! they produced.

use crate::core::ToolResult;

/// State of the generate → call tools → generate loop
#[derive(Debug, Clone)]
pub struct ToolLoopState {
    /// Rounds of tool calls executed so far
    pub round: usize,
    /// Maximum allowed rounds
    pub max_rounds: usize,
    /// Results from every executed tool, in call order
    pub results: Vec<ToolResult>,
}

impl ToolLoopState {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            round: 0,
            max_rounds,
            results: Vec::new(),
        }
    }

    /// Whether another round of tool calls may run
    pub fn can_run_tools(&self) -> bool {
        self.round < self.max_rounds
    }

    /// Record a finished round
    pub fn finish_round(&mut self, results: Vec<ToolResult>) {
        self.results.extend(results);
        self.round += 1;
    }

    /// Number of failed tool calls so far
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rounds_are_bounded() {
        let mut state = ToolLoopState::new(2);
        assert!(state.can_run_tools());

        state.finish_round(vec![ToolResult::success("calculator", json!(35))]);
        assert!(state.can_run_tools());

        state.finish_round(vec![ToolResult::failure("shell", "cd: /x: No such file or directory")]);
        assert!(!state.can_run_tools());
        assert_eq!(state.results.len(), 2);
        assert_eq!(state.failures(), 1);
    }

    #[test]
    fn test_zero_rounds_disables_tools() {
        assert!(!ToolLoopState::new(0).can_run_tools());
    }
}
