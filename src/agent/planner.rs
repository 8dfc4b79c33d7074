//! Planner
//!
//! Splits a complex request into ordered steps across agents. Entries that
//! lack a string `agentId` or `task` are dropped, so a sloppy reply yields
//! a shorter plan rather than an error.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::manager::ManagerContext;
use crate::agent::pipeline::PipelineTrace;
use crate::agent::prompt::roster_listing;
use crate::agent::structured::call_structured;
use crate::core::{Plan, PlanStep, Result};
use crate::llm::LLMProvider;

pub const STAGE_PLAN: &str = "generate_dynamic_plan";

/// Response schema for plans
pub fn plan_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "plan": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "agentId": { "type": "STRING" },
                        "task": { "type": "STRING" },
                        "rationale": { "type": "STRING" }
                    },
                    "required": ["agentId", "task"]
                }
            },
            "rationale": { "type": "STRING" }
        },
        "required": ["plan"]
    })
}

/// Build a plan for `latest_text`
pub async fn generate_dynamic_plan(
    provider: &dyn LLMProvider,
    ctx: &ManagerContext<'_>,
    latest_text: &str,
    trace: &mut PipelineTrace,
) -> Result<Plan> {
    let prompt = format!(
        "Agents:\n{}\n\nConversation so far:\n{}\n\nUser request: {}\n\n\
         Break the request into the fewest ordered steps needed, each handled by one \
         agent from the list. Reply with JSON: plan (array of objects with agentId, task \
         and rationale) and rationale (why this plan). Use an empty plan when one reply \
         from a single agent is enough.",
        roster_listing(ctx.agents),
        ctx.transcript(),
        latest_text
    );

    let reply = call_structured(
        provider,
        ctx.structured_call(STAGE_PLAN, ctx.instruction(None), prompt, Some(plan_schema())),
        trace,
    )
    .await?;

    let Value::Object(ref root) = reply.value else {
        return Err(reply.malformed("expected a JSON object"));
    };

    let entries = root
        .get("plan")
        .or_else(|| root.get("steps"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let steps: Vec<PlanStep> = entries.iter().filter_map(parse_step).collect();
    if steps.len() < entries.len() {
        warn!(
            dropped = entries.len() - steps.len(),
            "dropped malformed plan steps"
        );
    }

    let plan = Plan {
        steps,
        rationale: root
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    debug!(steps = plan.steps.len(), "plan generated");
    Ok(plan)
}

fn parse_step(entry: &Value) -> Option<PlanStep> {
    let agent_id = entry.get("agentId")?.as_str()?.trim();
    let task = entry.get("task")?.as_str()?.trim();
    if agent_id.is_empty() || task.is_empty() {
        return None;
    }
    Some(PlanStep {
        agent_id: agent_id.to_string(),
        task: task.to_string(),
        rationale: entry
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Agent, AgentManager, RoundtableError};
    use crate::llm::scripted::ScriptedProvider;

    async fn run_planner(reply: &str) -> Result<Plan> {
        let provider = ScriptedProvider::new().reply(reply);
        let manager = AgentManager::new("m");
        let agents = vec![Agent::new("coder", "Coder", "m"), Agent::new("writer", "Writer", "m")];
        let ctx = ManagerContext {
            manager: &manager,
            api_key: Some("key"),
            agents: &agents,
            history: &[],
            context_window: 10,
        };
        generate_dynamic_plan(&provider, &ctx, "build and document it", &mut PipelineTrace::new())
            .await
    }

    #[tokio::test]
    async fn test_malformed_steps_are_dropped() {
        let plan = run_planner(
            r#"{"plan": [
                {"agentId": "coder", "task": "build it", "rationale": "code first"},
                {"agentId": 7, "task": "bad id"},
                {"agentId": "writer"},
                {"agentId": "writer", "task": "document it"}
            ], "rationale": "two parts"}"#,
        )
        .await
        .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].agent_id, "coder");
        assert_eq!(plan.steps[1].task, "document it");
        assert_eq!(plan.steps[1].rationale, "");
        assert_eq!(plan.rationale, "two parts");
    }

    #[tokio::test]
    async fn test_zero_valid_steps_is_empty_plan() {
        let plan = run_planner(r#"{"plan": [{"task": "orphan"}, "nonsense"]}"#).await.unwrap();
        assert!(plan.is_empty());

        let plan = run_planner(r#"{"rationale": "nothing to do"}"#).await.unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.rationale, "nothing to do");
    }

    #[tokio::test]
    async fn test_non_json_is_error() {
        let err = run_planner("sure, here is a plan").await.unwrap_err();
        assert!(matches!(err, RoundtableError::StructuredOutput { .. }));
    }
}
