//! Roundtable - Multi-Agent Conversation Orchestration
//!
//! A roster of agents shares one conversation over a hosted generative-AI
//! API. For every user message an Agent Manager picks who speaks (or a
//! moderator decides whether anyone should), optionally plans a sequence of
//! agents, and the chosen agent answers with streaming, tool calls and a
//! short summary for the shared history.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, memory and error handling
//! - **LLM**: Provider abstraction with the hosted generation client
//! - **Agent**: Response generation, turn selection, planning and the orchestrator
//! - **Tools**: Tool registry with the built-in tools
//! - **Embedded**: Commands embedded in HTML comments of automated pages
//! - **Store**: Conversation and prompt persistence
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use roundtable::agent::{Orchestrator, TurnEvent};
//! use roundtable::Config;
//!
//! #[tokio::main]
//! async fn main() -> roundtable::Result<()> {
//!     let mut orchestrator = Orchestrator::from_config(Config::load())?;
//!     let print = |event: TurnEvent<'_>| {
//!         if let TurnEvent::Token(chunk) = event {
//!             print!("{}", chunk);
//!         }
//!     };
//!
//!     orchestrator.process("What is 5 * 7?", None, &print).await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod embedded;
pub mod llm;
pub mod store;
pub mod tools;

// Re-export commonly used items
pub use agent::Orchestrator;
pub use cli::Repl;
pub use core::{Config, Result, RoundtableError};
