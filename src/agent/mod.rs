//! Agent module - conversation orchestration
//!
//! Contains the response generator, the Agent Manager jobs (turn
//! selection, moderation, planning, memory, titles) and the orchestrator
//! that runs a user turn end to end.

pub mod conversation;
pub mod generator;
pub mod loop_state;
pub mod manager;
pub mod moderator;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod prompt;
pub mod structured;
pub mod turn;

pub use conversation::Conversation;
pub use generator::{GenerationInput, GenerationOutput, GeneratorSettings, ResponseGenerator};
pub use loop_state::ToolLoopState;
pub use manager::{extract_memory, generate_title, ManagerContext};
pub use moderator::{moderate_turn, ModeratorDecision, TurnDecision};
pub use orchestrator::{EventCallback, Orchestrator, Selection, TurnEvent, TurnOutcome};
pub use pipeline::PipelineTrace;
pub use planner::generate_dynamic_plan;
pub use turn::{decide_next_speaker, SpeakerDecision};
