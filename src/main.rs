//! Roundtable - multi-agent conversations
//!
//! Main entry point for the CLI application.

use clap::Parser;
use roundtable::agent::{Orchestrator, TurnEvent};
use roundtable::core::config::TurnStrategy;
use roundtable::{Config, Repl};
use tracing_subscriber::EnvFilter;

/// Roundtable - multi-agent conversations over a hosted generation API
#[derive(Parser, Debug)]
#[command(name = "roundtable")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model for the Agent Manager and every agent
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Enable debug logging and pipeline traces
    #[arg(long, short = 'd')]
    debug: bool,

    /// Turn strategy: manager or moderator
    #[arg(long, short = 's')]
    strategy: Option<TurnStrategy>,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "roundtable=debug"
    } else {
        "roundtable=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(ref model) = args.model {
        config.manager.model = model.clone();
        for agent in &mut config.agents {
            agent.model = model.clone();
        }
    }

    if let Some(strategy) = args.strategy {
        config.orchestration.strategy = strategy;
    }

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let mut orchestrator = Orchestrator::from_config(config)?;
        let on_event = |event: TurnEvent<'_>| {
            if let TurnEvent::Waiting { rationale } = event {
                eprintln!("(no reply: {})", rationale);
            }
        };

        let outcome = orchestrator.process(&prompt, None, &on_event).await?;
        for reply in &outcome.replies {
            let name = reply
                .sender
                .agent_id()
                .and_then(|id| orchestrator.config().agent(id))
                .map(|a| a.name.as_str())
                .unwrap_or("agent");
            println!("{}:\n{}\n", name, reply.text);
        }
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::with_config(config, args.debug)?;
    repl.run().await?;

    Ok(())
}
