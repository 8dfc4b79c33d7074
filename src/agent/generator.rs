//! Response generator
//!
//! Runs one agent turn: layered system instruction, streamed generation,
//! tool calls fed back into follow-up generations, then a short
//! self-summary for long replies. Each external call lands on the
//! pipeline trace.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::agent::loop_state::ToolLoopState;
use crate::agent::pipeline::PipelineTrace;
use crate::agent::prompt::build_system_instruction;
use crate::core::config::OrchestrationConfig;
use crate::core::{
    Agent, Attachment, LongTermMemory, Message, Result, RoundtableError, ToolResult,
};
use crate::llm::content::{push_merged, ROLE_MODEL, ROLE_USER};
use crate::llm::{
    history_to_contents, Content, GenerateRequest, LLMProvider, LLMResponse, Part,
    StreamCallback, TokenUsage,
};
use crate::tools::{ToolContext, ToolRegistry};

pub const STAGE_GENERATE: &str = "generate";
pub const STAGE_FOLLOW_UP: &str = "generate_after_tools";
pub const STAGE_TOOLS: &str = "tool_calls";
pub const STAGE_SUMMARIZE: &str = "summarize";

/// Knobs taken from the orchestration config
#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    /// Replies longer than this many UTF-16 code units get a self-summary
    pub summary_threshold: usize,
    pub summary_max_words: usize,
    pub max_tool_rounds: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            summary_threshold: 250,
            summary_max_words: 15,
            max_tool_rounds: 3,
        }
    }
}

impl From<&OrchestrationConfig> for GeneratorSettings {
    fn from(config: &OrchestrationConfig) -> Self {
        Self {
            summary_threshold: config.summary_threshold,
            summary_max_words: config.summary_max_words,
            max_tool_rounds: config.max_tool_rounds,
        }
    }
}

/// Everything one agent turn reads
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    /// Text the agent responds to, sent as the final user turn
    pub latest_text: &'a str,
    pub agent: &'a Agent,
    /// Conversation before `latest_text`
    pub history: &'a [Message],
    pub roster: &'a [Agent],
    pub attachment: Option<&'a Attachment>,
    /// Replaces the agent's own base instruction
    pub instruction_override: Option<&'a str>,
    pub memory: &'a LongTermMemory,
    pub recent_topic: Option<&'a str>,
    pub api_key: Option<&'a str>,
}

/// Result of one agent turn
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub text: String,
    pub summary: String,
    pub pipeline: PipelineTrace,
    pub usage: TokenUsage,
    pub tool_results: Vec<ToolResult>,
}

/// Produces agent replies against a provider and a tool registry
#[derive(Clone)]
pub struct ResponseGenerator {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    settings: GeneratorSettings,
}

impl ResponseGenerator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> GeneratorSettings {
        self.settings
    }

    /// Run one turn. A missing credential fails before any call is made;
    /// any later failure is wrapped with its stage, the latest text and the
    /// text streamed so far. No call is retried.
    pub async fn generate(
        &self,
        input: GenerationInput<'_>,
        on_token: &StreamCallback<'_>,
    ) -> Result<GenerationOutput> {
        let api_key = input
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RoundtableError::MissingCredential {
                stage: STAGE_GENERATE.to_string(),
            })?;

        let agent = input.agent;
        let declarations = self.tools.definitions_for(&agent.tools);
        let instruction = build_system_instruction(
            agent,
            &declarations,
            input.memory,
            input.recent_topic,
            input.instruction_override.unwrap_or(&agent.system_instruction),
        );

        let mut contents = history_to_contents(input.history, &agent.id, input.roster);
        let mut latest = vec![Part::text(input.latest_text)];
        if let Some(attachment) = input.attachment {
            latest.push(Part::attachment(attachment));
        }
        push_merged(&mut contents, Content::new(ROLE_USER, latest));

        let partial = Mutex::new(String::new());
        let forward = |chunk: &str| {
            partial.lock().push_str(chunk);
            on_token(chunk);
        };

        let mut output = GenerationOutput::default();
        let mut state = ToolLoopState::new(self.settings.max_tool_rounds);
        let ctx = Arc::new(ToolContext::new(input.history.to_vec()));

        info!(agent = %agent.id, model = %agent.model, "generating reply");

        loop {
            let stage = if state.round == 0 {
                STAGE_GENERATE
            } else {
                STAGE_FOLLOW_UP
            };
            let request = GenerateRequest::new(&agent.model, contents.clone(), api_key)
                .with_system_instruction(instruction.clone())
                .with_tools(declarations.clone());

            let started = Instant::now();
            let response = self
                .provider
                .generate_stream(&request, &forward)
                .await
                .map_err(|e| {
                    RoundtableError::at_stage(
                        stage,
                        input.latest_text,
                        Some(partial.lock().clone()),
                        e,
                    )
                })?;
            output.pipeline.record(
                stage,
                step_input(&contents),
                describe_response(&response),
                Some(started.elapsed()),
            );
            if let Some(usage) = response.usage {
                output.usage += usage;
            }

            if response.function_calls.is_empty() {
                break;
            }
            if !state.can_run_tools() {
                warn!(
                    agent = %agent.id,
                    rounds = state.round,
                    "tool round limit reached, ignoring further calls"
                );
                break;
            }

            let calls = response.function_calls;
            debug!(count = calls.len(), "executing tool calls");
            let started = Instant::now();
            let results = self.tools.execute_all(&calls, Arc::clone(&ctx)).await;
            output.pipeline.record(
                STAGE_TOOLS,
                json!(calls).to_string(),
                json!(results
                    .iter()
                    .map(|r| json!({ "name": r.tool_name, "response": r.to_response() }))
                    .collect::<Vec<_>>())
                .to_string(),
                Some(started.elapsed()),
            );

            let mut model_parts = Vec::new();
            if !response.text.is_empty() {
                model_parts.push(Part::text(response.text));
            }
            model_parts.extend(calls.iter().map(Part::function_call));
            contents.push(Content::new(ROLE_MODEL, model_parts));
            contents.push(Content::new(
                ROLE_USER,
                results
                    .iter()
                    .map(|r| Part::function_response(&r.tool_name, r.to_response()))
                    .collect(),
            ));

            state.finish_round(results);
        }

        output.text = partial.into_inner();
        output.tool_results = state.results;
        output.summary = self.summarize(agent, api_key, &output.text, &mut output.pipeline).await;

        Ok(output)
    }

    /// Ask the agent's model for a short summary of its own reply. Replies
    /// at or under the threshold, and failed summaries, use the full text.
    async fn summarize(
        &self,
        agent: &Agent,
        api_key: &str,
        text: &str,
        trace: &mut PipelineTrace,
    ) -> String {
        // Length as a browser counts it, so astral characters weigh two.
        if text.encode_utf16().count() <= self.settings.summary_threshold {
            return text.to_string();
        }

        let prompt = format!(
            "Summarize the following response in at most {} words. Reply with the summary only.\n\n{}",
            self.settings.summary_max_words, text
        );
        let request = GenerateRequest::new(
            &agent.model,
            vec![Content::user_text(prompt.clone())],
            api_key,
        );

        let started = Instant::now();
        match self.provider.generate(&request).await {
            Ok(response) => {
                trace.record(STAGE_SUMMARIZE, prompt, &response.text, Some(started.elapsed()));
                let summary = response.text.trim();
                if summary.is_empty() {
                    warn!(agent = %agent.id, "empty summary, using full text");
                    text.to_string()
                } else {
                    summary.to_string()
                }
            }
            Err(e) => {
                warn!(agent = %agent.id, error = %e, "summary failed, using full text");
                trace.record(
                    STAGE_SUMMARIZE,
                    prompt,
                    format!("error: {}", e),
                    Some(started.elapsed()),
                );
                text.to_string()
            }
        }
    }
}

/// Text of the newest content block, used as the trace input
fn step_input(contents: &[Content]) -> String {
    contents
        .last()
        .map(|c| serde_json::to_string(c).unwrap_or_else(|_| c.text()))
        .unwrap_or_default()
}

fn describe_response(response: &LLMResponse) -> String {
    if response.function_calls.is_empty() {
        response.text.clone()
    } else {
        let names: Vec<&str> = response.function_calls.iter().map(|c| c.name.as_str()).collect();
        format!("{}[function calls: {}]", response.text, names.join(", "))
    }
}
