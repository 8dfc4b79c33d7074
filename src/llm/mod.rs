//! LLM module - hosted generation API integration
//!
//! Provides the provider abstraction, the wire content format and the
//! hosted API client.

pub mod content;
pub mod gemini;
#[cfg(test)]
pub(crate) mod scripted;
pub mod traits;

pub use content::{history_to_contents, Content, Part};
pub use gemini::GeminiClient;
pub use traits::{
    GenerateRequest, GenerationConfig, LLMProvider, LLMResponse, StreamCallback, TokenUsage,
};
