//! CLI commands
//!
//! Special commands that can be executed in the REPL. A bare keyword is a
//! command only when it is the whole line; commands with arguments need a
//! leading `/` so prose like "plan a trip" still reaches the agents.

use crate::agent::Orchestrator;
use crate::core::config::TurnStrategy;
use crate::core::{Plan, Result};

/// Result of parsing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Continue processing as normal input
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// Conversation was cleared
    Clear,
    /// Flip pipeline trace output
    ToggleDebug,
}

/// Parse and handle special commands
pub async fn handle_command(input: &str, orchestrator: &mut Orchestrator) -> Result<CommandResult> {
    let input = input.trim();
    let (slashed, body) = match input.strip_prefix('/') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, input),
    };
    let (cmd, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let cmd = cmd.to_lowercase();
    let args = args.trim();

    if !slashed && !args.is_empty() {
        return Ok(CommandResult::Continue(input.to_string()));
    }

    match cmd.as_str() {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "clear" | "reset" => {
            orchestrator.clear().await;
            Ok(CommandResult::Clear)
        }

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "agents" => Ok(CommandResult::Handled(agents_text(orchestrator))),

        "memory" => {
            let memory = &orchestrator.conversation().memory;
            if memory.is_empty() {
                Ok(CommandResult::Handled("Long-term memory is empty.".to_string()))
            } else {
                Ok(CommandResult::Handled(format!(
                    "Long-term memory:\n{}",
                    serde_json::to_string_pretty(memory)?
                )))
            }
        }

        "plan" => {
            if args.is_empty() {
                return Ok(CommandResult::Handled("Usage: /plan <request>".to_string()));
            }
            let (plan, _) = orchestrator.plan(args).await?;
            Ok(CommandResult::Handled(plan_text(&plan, orchestrator)))
        }

        "strategy" => {
            if args.is_empty() {
                return Ok(CommandResult::Handled(format!(
                    "Current strategy: {}",
                    orchestrator.config().orchestration.strategy
                )));
            }
            let strategy: TurnStrategy = args.parse()?;
            orchestrator.set_strategy(strategy);
            Ok(CommandResult::Handled(format!("Strategy set to: {}", strategy)))
        }

        "status" => Ok(CommandResult::Handled(status_text(orchestrator))),

        "debug" => Ok(CommandResult::ToggleDebug),

        "save-config" => {
            let path = orchestrator.config().save()?;
            Ok(CommandResult::Handled(format!(
                "Configuration saved to {}",
                path.display()
            )))
        }

        _ => {
            if slashed {
                Ok(CommandResult::Handled(format!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    cmd
                )))
            } else {
                Ok(CommandResult::Continue(input.to_string()))
            }
        }
    }
}

fn agents_text(orchestrator: &Orchestrator) -> String {
    let agents = &orchestrator.config().agents;
    if agents.is_empty() {
        return "No agents configured. Add [[agents]] entries to the config file.".to_string();
    }

    let mut output = String::from("Agents:\n");
    for agent in agents {
        output.push_str(&format!(
            "  [{}] {} ({}) - {}\n",
            if agent.enabled { "x" } else { " " },
            agent.name,
            agent.id,
            agent.model
        ));
        if !agent.job_title.is_empty() {
            output.push_str(&format!("      {}\n", agent.job_title));
        }
        if !agent.tools.is_empty() {
            output.push_str(&format!("      tools: {}\n", agent.tools.join(", ")));
        }
    }
    output
}

fn plan_text(plan: &Plan, orchestrator: &Orchestrator) -> String {
    if plan.is_empty() {
        return "The manager produced an empty plan.".to_string();
    }

    let mut output = String::from("Plan:\n");
    for (i, step) in plan.steps.iter().enumerate() {
        let name = orchestrator
            .config()
            .agent(&step.agent_id)
            .map(|a| a.name.as_str())
            .unwrap_or(step.agent_id.as_str());
        output.push_str(&format!("  {}. {}: {}\n", i + 1, name, step.task));
    }
    if !plan.rationale.is_empty() {
        output.push_str(&format!("\nRationale: {}", plan.rationale));
    }
    output
}

fn status_text(orchestrator: &Orchestrator) -> String {
    let config = orchestrator.config();
    let conversation = orchestrator.conversation();
    format!(
        "Roundtable Status:\n\
         ─────────────────────────────\n\
         Provider:   {}\n\
         Manager:    {}\n\
         Strategy:   {}\n\
         Agents:     {} enabled of {}\n\
         Planning:   {}\n\
         Title:      {}\n\
         History:    {} messages\n\
         Tokens:     {}\n\
         Store:      {}",
        orchestrator.provider_name(),
        config.manager.model,
        config.orchestration.strategy,
        orchestrator.enabled_agents().len(),
        config.agents.len(),
        if config.orchestration.planning { "on" } else { "off" },
        conversation.title.as_deref().unwrap_or("(untitled)"),
        conversation.len(),
        conversation.token_count,
        orchestrator.store().map(|s| s.name()).unwrap_or("none"),
    )
}

/// Generate help text
fn help_text() -> String {
    r#"Roundtable Commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Exit Roundtable
  clear, reset     Clear the conversation and its memory
  agents           List the agent roster
  memory           Show long-term memory
  /plan <request>  Show the plan the manager would run
  /strategy [name] Show or set the turn strategy (manager|moderator)
  status           Show current configuration
  debug            Toggle pipeline trace output
  save-config      Write the current configuration to disk

Keyboard Shortcuts:
  Ctrl+D           Exit Roundtable

Every command also works with a leading '/'; commands that take
arguments need it. Anything else is sent to the table as your message.
─────────────────────────────────────────────"#
        .to_string()
}
