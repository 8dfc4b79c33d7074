//! Turn manager
//!
//! Picks which agent answers a user message by asking the Agent Manager to
//! classify topic continuity. One structured call per invocation; empty or
//! non-JSON output is an error, and the caller decides whether to retry.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::manager::ManagerContext;
use crate::agent::pipeline::PipelineTrace;
use crate::agent::prompt::roster_listing;
use crate::agent::structured::call_structured;
use crate::core::Result;
use crate::llm::LLMProvider;

pub const STAGE_TURN: &str = "decide_next_speaker";

/// Outcome of speaker selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerDecision {
    /// Enabled agent that should answer, if any
    pub next_speaker_id: Option<String>,
    /// Label of a newly detected topic
    pub new_topic: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakerReply {
    #[serde(default)]
    next_speaker_id: Option<String>,
    #[serde(default)]
    new_topic: Option<String>,
}

/// Response schema for speaker selection
pub fn speaker_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "nextSpeakerId": { "type": "STRING", "nullable": true },
            "newTopic": { "type": "STRING", "nullable": true }
        },
        "required": ["nextSpeakerId"]
    })
}

/// Choose the next speaker for `latest_text`.
///
/// An id that is not an enabled roster agent is reported as no speaker.
pub async fn decide_next_speaker(
    provider: &dyn LLMProvider,
    ctx: &ManagerContext<'_>,
    latest_text: &str,
    instruction_override: Option<&str>,
    trace: &mut PipelineTrace,
) -> Result<SpeakerDecision> {
    let last_speaker = ctx
        .history
        .iter()
        .rev()
        .find_map(|m| m.sender.agent_id())
        .unwrap_or("none");

    let prompt = format!(
        "Agents:\n{}\n\nConversation so far:\n{}\n\nLast agent to speak: {}\n\
         Latest user message: {}\n\n\
         Decide which agent should answer the latest message. If the user continues the \
         current topic, keep the last agent unless another agent is clearly better suited. \
         If the topic changed, pick the best-suited agent and name the new topic in a few \
         words. Reply with JSON: nextSpeakerId (an id from the list, or null if nobody \
         fits) and newTopic (null when the topic did not change).",
        roster_listing(ctx.agents),
        ctx.transcript(),
        last_speaker,
        latest_text
    );

    let instruction = ctx.instruction(instruction_override);
    let reply = call_structured(
        provider,
        ctx.structured_call(STAGE_TURN, instruction, prompt, Some(speaker_schema())),
        trace,
    )
    .await?;
    let parsed: SpeakerReply = reply.decode()?;

    let next_speaker_id = parsed
        .next_speaker_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .and_then(|id| {
            if ctx.find_agent(&id).is_some() {
                Some(id)
            } else {
                warn!(speaker = %id, "turn manager chose an unknown or disabled agent");
                None
            }
        });
    let new_topic = parsed
        .new_topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    debug!(speaker = ?next_speaker_id, topic = ?new_topic, "speaker decided");
    Ok(SpeakerDecision {
        next_speaker_id,
        new_topic,
    })
}
