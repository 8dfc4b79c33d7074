//! Interactive REPL for Roundtable
//!
//! Provides the main user interaction loop.

use std::io::{self, BufRead, Write};

use crate::agent::{Orchestrator, TurnEvent, TurnOutcome};
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{Config, PipelineStep, Result};

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    orchestrator: Orchestrator,
    /// Print the pipeline trace after each turn
    debug: bool,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub fn with_config(config: Config, debug: bool) -> Result<Self> {
        Ok(Self {
            orchestrator: Orchestrator::from_config(config)?,
            debug,
        })
    }

    pub fn from_orchestrator(orchestrator: Orchestrator, debug: bool) -> Self {
        Self {
            orchestrator,
            debug,
        }
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        if self.orchestrator.enabled_agents().is_empty() {
            println!("No enabled agents. Edit {} to add some.", Config::config_file().display());
            return Ok(());
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match handle_command(input, &mut self.orchestrator).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Clear) => {
                    println!("Conversation cleared.\n");
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                }
                Ok(CommandResult::ToggleDebug) => {
                    self.debug = !self.debug;
                    println!("Debug mode: {}\n", if self.debug { "ON" } else { "OFF" });
                }
                Ok(CommandResult::Continue(input)) => {
                    if let Err(e) = self.send(&input).await {
                        eprintln!("\nError: {}\n", e);
                    }
                }
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    /// Run one turn and print it
    pub async fn send(&mut self, input: &str) -> Result<TurnOutcome> {
        let print_tokens = self.orchestrator.config().streaming.print_tokens;
        let on_event = move |event: TurnEvent<'_>| print_event(event, print_tokens);

        let outcome = self
            .orchestrator
            .process(input, None, &on_event)
            .await?;

        if !print_tokens {
            for reply in &outcome.replies {
                println!("{}", reply.text);
            }
        }
        println!();
        if self.debug {
            print_trace(&outcome.trace);
        }
        Ok(outcome)
    }

    /// Print the startup banner
    fn print_banner(&self) {
        let config = self.orchestrator.config();

        println!();
        println!("Roundtable - multi-agent conversations");
        println!("─────────────────────────────────────────────");
        println!("Provider:  {}", self.orchestrator.provider_name());
        println!("Manager:   {}", config.manager.model);
        println!("Strategy:  {}", config.orchestration.strategy);
        println!(
            "Agents:    {}",
            self.orchestrator
                .enabled_agents()
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!();
        println!("Commands: help, agents, memory, /plan <request>, status, exit");
        println!("─────────────────────────────────────────────");
    }
}

fn print_event(event: TurnEvent<'_>, print_tokens: bool) {
    match event {
        TurnEvent::Speaker { name, .. } => println!("\n{}:", name),
        TurnEvent::Token(chunk) if print_tokens => {
            print!("{}", chunk);
            let _ = io::stdout().flush();
        }
        TurnEvent::Token(_) => {}
        TurnEvent::Waiting { rationale } => {
            println!("\n(The table waits for you: {})", rationale);
        }
    }
}

fn print_trace(trace: &[PipelineStep]) {
    println!("Pipeline:");
    for step in trace {
        match step.duration_ms {
            Some(ms) => println!("  {:<24} {:>6} ms", step.stage, ms),
            None => println!("  {}", step.stage),
        }
    }
    println!();
}
