//! Prompt assembly
//!
//! Builds system instructions for agents and the plain-text transcripts the
//! Agent Manager reads.

use crate::core::{Agent, LongTermMemory, Message, Sender, ToolDefinition};

/// Prepended when the agent has tools, so it calls them instead of guessing
pub const TOOL_NOTICE: &str = "You have access to tools. When a request needs a calculation, \
a weather lookup, a file or shell operation, or the text of an earlier message, call the \
matching tool and base your answer on its result. Never invent tool output.";

/// Layer the system instruction for one agent turn:
/// tool notice, knowledge, memory, topic hint, then the base instruction.
pub fn build_system_instruction(
    agent: &Agent,
    tools: &[ToolDefinition],
    memory: &LongTermMemory,
    recent_topic: Option<&str>,
    base: &str,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !tools.is_empty() {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        sections.push(format!("{}\nAvailable tools: {}", TOOL_NOTICE, names.join(", ")));
    }

    if !agent.knowledge.trim().is_empty() {
        sections.push(format!("## Background knowledge\n{}", agent.knowledge.trim()));
    }

    if !memory.is_empty() {
        sections.push(format!(
            "## Long-term memory (facts about this conversation)\n{}",
            memory.to_prompt_block()
        ));
    }

    if let Some(topic) = recent_topic.filter(|t| !t.trim().is_empty()) {
        sections.push(format!(
            "The conversation recently moved to a new topic: {}",
            topic.trim()
        ));
    }

    let mut identity = format!("You are {}", agent.name);
    if !agent.job_title.is_empty() {
        identity.push_str(&format!(", {}", agent.job_title));
    }
    identity.push('.');
    if !agent.job_description.is_empty() {
        identity.push_str(&format!(" You {}.", agent.job_description.trim_end_matches('.')));
    }
    if !agent.goals.is_empty() {
        identity.push_str(&format!(" Your goals: {}.", agent.goals.join("; ")));
    }
    sections.push(identity);

    if !base.trim().is_empty() {
        sections.push(base.trim().to_string());
    }

    sections.join("\n\n")
}

/// Display name for a sender
pub fn sender_name<'a>(sender: &'a Sender, roster: &'a [Agent]) -> &'a str {
    match sender {
        Sender::User => "User",
        Sender::System => "System",
        Sender::Agent(id) => roster
            .iter()
            .find(|a| &a.id == id)
            .map(|a| a.name.as_str())
            .unwrap_or(id),
    }
}

/// Last `window` messages as `Name (id): text` lines. Long agent replies
/// are shown by their summary.
pub fn transcript(history: &[Message], roster: &[Agent], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| {
            let speaker = match &m.sender {
                Sender::Agent(id) => format!("{} [{}]", sender_name(&m.sender, roster), id),
                other => sender_name(other, roster).to_string(),
            };
            format!("{} (msg {}): {}", speaker, m.id, m.summary_or_text())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Enabled agents, one description per line
pub fn roster_listing(agents: &[Agent]) -> String {
    agents
        .iter()
        .filter(|a| a.enabled)
        .map(Agent::describe)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent() -> Agent {
        Agent::new("coder", "Ada", "m")
            .with_job("Engineer", "writes code")
            .with_knowledge("Rust 2021")
    }

    #[test]
    fn test_instruction_layers_in_order() {
        let mut memory = LongTermMemory::new();
        memory.merge_value(&json!({"user_name": "Sam"}));
        let tools = vec![ToolDefinition::function("calculator", "math", json!({"type": "object"}))];

        let text = build_system_instruction(&agent(), &tools, &memory, Some("lifetimes"), "Be brief.");

        let tool_at = text.find(TOOL_NOTICE).unwrap();
        let knowledge_at = text.find("Rust 2021").unwrap();
        let memory_at = text.find("Sam").unwrap();
        let topic_at = text.find("lifetimes").unwrap();
        let base_at = text.find("Be brief.").unwrap();
        assert!(tool_at < knowledge_at);
        assert!(knowledge_at < memory_at);
        assert!(memory_at < topic_at);
        assert!(topic_at < base_at);
    }

    #[test]
    fn test_instruction_skips_empty_layers() {
        let text = build_system_instruction(
            &Agent::new("a", "Bo", "m"),
            &[],
            &LongTermMemory::new(),
            None,
            "",
        );
        assert_eq!(text, "You are Bo.");
    }

    #[test]
    fn test_transcript_window_and_summaries() {
        let roster = vec![agent()];
        let history = vec![
            Message::user("first"),
            Message::user("second"),
            Message::agent("coder", "a very long answer").with_summary("short"),
        ];
        let text = transcript(&history, &roster, 2);
        assert!(!text.contains("first"));
        assert!(text.contains("User (msg"));
        assert!(text.contains("Ada [coder]"));
        assert!(text.ends_with("short"));
    }
}
