//! Agent Manager jobs
//!
//! The Agent Manager is the pseudo-agent behind turn selection, moderation,
//! planning, memory extraction and titles. This module holds the context
//! those calls share plus the memory and title jobs.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::debug;

use crate::agent::pipeline::PipelineTrace;
use crate::agent::prompt::transcript;
use crate::agent::structured::{call_structured, StructuredCall};
use crate::core::{Agent, AgentManager, LongTermMemory, Message, Result, RoundtableError};
use crate::llm::{Content, GenerateRequest, LLMProvider};

pub const STAGE_MEMORY: &str = "extract_memory";
pub const STAGE_TITLE: &str = "generate_title";

const MAX_TITLE_CHARS: usize = 60;

/// What every Agent Manager call reads
#[derive(Debug, Clone, Copy)]
pub struct ManagerContext<'a> {
    pub manager: &'a AgentManager,
    /// Resolved credential for the manager
    pub api_key: Option<&'a str>,
    pub agents: &'a [Agent],
    /// Conversation before the message being handled
    pub history: &'a [Message],
    /// How many recent messages go into transcripts
    pub context_window: usize,
}

impl<'a> ManagerContext<'a> {
    /// Enabled participants only
    pub fn enabled_agents(&self) -> Vec<&'a Agent> {
        self.agents.iter().filter(|a| a.enabled).collect()
    }

    pub fn find_agent(&self, id: &str) -> Option<&'a Agent> {
        self.agents.iter().find(|a| a.id == id && a.enabled)
    }

    pub fn transcript(&self) -> String {
        let text = transcript(self.history, self.agents, self.context_window);
        if text.is_empty() {
            "(no earlier messages)".to_string()
        } else {
            text
        }
    }

    /// Manager instruction, or the override when one is given
    pub fn instruction(&self, instruction_override: Option<&'a str>) -> &'a str {
        instruction_override
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.manager.system_instruction)
    }

    pub(crate) fn structured_call(
        &self,
        stage: &'a str,
        instruction: &'a str,
        prompt: String,
        schema: Option<Value>,
    ) -> StructuredCall<'a> {
        StructuredCall {
            stage,
            model: &self.manager.model,
            system_instruction: instruction,
            prompt,
            schema,
            api_key: self.api_key,
        }
    }
}

/// Pull durable facts out of the last `window` messages.
///
/// Returns only the new or changed facts, ready to merge into memory. The
/// reply must be a JSON object; anything else is malformed output.
pub async fn extract_memory(
    provider: &dyn LLMProvider,
    ctx: &ManagerContext<'_>,
    memory: &LongTermMemory,
    window: usize,
    trace: &mut PipelineTrace,
) -> Result<Map<String, Value>> {
    let recent = transcript(ctx.history, ctx.agents, window);
    let prompt = format!(
        "Current long-term memory:\n{}\n\nRecent messages:\n{}\n\n\
         Extract durable facts worth remembering for the rest of this conversation \
         (user preferences, names, decisions, constraints). Reply with a JSON object \
         holding only new or changed facts under short descriptive keys. Nested objects \
         are allowed. Reply with {{}} when there is nothing new.",
        memory.to_prompt_block(),
        recent
    );

    let reply = call_structured(
        provider,
        ctx.structured_call(STAGE_MEMORY, ctx.instruction(None), prompt, None),
        trace,
    )
    .await?;

    match reply.value {
        Value::Object(ref facts) => {
            debug!(keys = facts.len(), "extracted memory facts");
            Ok(facts.clone())
        }
        _ => Err(reply.malformed("expected a JSON object of facts")),
    }
}

/// Short conversation title from the first exchange
pub async fn generate_title(
    provider: &dyn LLMProvider,
    ctx: &ManagerContext<'_>,
    trace: &mut PipelineTrace,
) -> Result<String> {
    let api_key = ctx
        .api_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| RoundtableError::MissingCredential {
            stage: STAGE_TITLE.to_string(),
        })?;

    let opening = transcript(&ctx.history[..ctx.history.len().min(2)], ctx.agents, 2);
    let prompt = format!(
        "Write a title of at most six words for a conversation that starts like this. \
         Reply with the title only, no quotes.\n\n{}",
        opening
    );
    let request = GenerateRequest::new(
        &ctx.manager.model,
        vec![Content::user_text(prompt.clone())],
        api_key,
    );

    let started = Instant::now();
    let response = provider
        .generate(&request)
        .await
        .map_err(|e| RoundtableError::at_stage(STAGE_TITLE, prompt.clone(), None, e))?;
    trace.record(STAGE_TITLE, &prompt, &response.text, Some(started.elapsed()));

    let title = clean_title(&response.text);
    if title.is_empty() {
        return Err(RoundtableError::at_stage(
            STAGE_TITLE,
            prompt,
            None,
            RoundtableError::Other("empty title".to_string()),
        ));
    }
    Ok(title)
}

fn clean_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = line
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim();
    trimmed.chars().take(MAX_TITLE_CHARS).collect()
}
