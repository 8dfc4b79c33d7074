//! Moderator
//!
//! Alternate turn strategy: the Agent Manager reviews the conversation
//! against house rules and decides whether an agent speaks or the floor
//! goes back to the user. All five reply fields are required, nullable
//! ones included; a reply missing any of them is handled exactly like a
//! JSON parse failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::manager::ManagerContext;
use crate::agent::pipeline::PipelineTrace;
use crate::agent::prompt::roster_listing;
use crate::agent::structured::{call_structured, required_nullable};
use crate::core::Result;
use crate::llm::LLMProvider;

pub const STAGE_MODERATE: &str = "moderate_turn";

/// Whether someone speaks now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDecision {
    Speak,
    WaitForUser,
}

/// Structured moderator verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeratorDecision {
    /// Rule violations or quality notes on the last turn
    #[serde(deserialize_with = "required_nullable")]
    pub critique: Option<String>,
    pub decision: TurnDecision,
    #[serde(deserialize_with = "required_nullable")]
    pub next_speaker_id: Option<String>,
    /// What the chosen agent should do
    #[serde(deserialize_with = "required_nullable")]
    pub task: Option<String>,
    pub rationale: String,
}

impl ModeratorDecision {
    /// Speaker to run, if the decision is to speak
    pub fn speaker(&self) -> Option<&str> {
        match self.decision {
            TurnDecision::Speak => self.next_speaker_id.as_deref(),
            TurnDecision::WaitForUser => None,
        }
    }
}

/// Response schema; every property is listed as required
pub fn moderator_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "critique": { "type": "STRING", "nullable": true },
            "decision": { "type": "STRING", "enum": ["speak", "wait_for_user"] },
            "nextSpeakerId": { "type": "STRING", "nullable": true },
            "task": { "type": "STRING", "nullable": true },
            "rationale": { "type": "STRING" }
        },
        "required": ["critique", "decision", "nextSpeakerId", "task", "rationale"]
    })
}

/// Ask the moderator who speaks next under `house_rules`.
///
/// A `speak` decision naming an unknown or disabled agent is downgraded to
/// `wait_for_user`.
pub async fn moderate_turn(
    provider: &dyn LLMProvider,
    ctx: &ManagerContext<'_>,
    house_rules: &str,
    trace: &mut PipelineTrace,
) -> Result<ModeratorDecision> {
    let prompt = format!(
        "House rules:\n{}\n\nAgents:\n{}\n\nConversation so far:\n{}\n\n\
         Review the latest turn against the house rules. Decide whether one agent should \
         speak now or whether to wait for the user. Reply with JSON holding all five \
         fields: critique (string or null), decision (\"speak\" or \"wait_for_user\"), \
         nextSpeakerId (agent id or null), task (what that agent should do, or null) and \
         rationale (string).",
        house_rules,
        roster_listing(ctx.agents),
        ctx.transcript()
    );

    let reply = call_structured(
        provider,
        ctx.structured_call(
            STAGE_MODERATE,
            ctx.instruction(None),
            prompt,
            Some(moderator_schema()),
        ),
        trace,
    )
    .await?;
    let mut decision: ModeratorDecision = reply.decode()?;

    if decision.decision == TurnDecision::Speak {
        let valid = decision
            .next_speaker_id
            .as_deref()
            .is_some_and(|id| ctx.find_agent(id).is_some());
        if !valid {
            warn!(
                speaker = ?decision.next_speaker_id,
                "moderator chose to speak without a valid agent, waiting for user"
            );
            decision.decision = TurnDecision::WaitForUser;
        }
    }

    debug!(decision = ?decision.decision, speaker = ?decision.next_speaker_id, "moderated turn");
    Ok(decision)
}
