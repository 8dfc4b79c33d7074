//! Custom error types for Roundtable
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for Roundtable operations
#[derive(Error, Debug)]
pub enum RoundtableError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API credential available for a model call
    #[error("No API key configured for stage '{stage}'. Set GEMINI_API_KEY or configure one per agent")]
    MissingCredential { stage: String },

    /// Generation API connection or status errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// A failure inside one generation call, with enough context to replay it
    #[error("{stage} failed: {source}")]
    Stage {
        stage: String,
        prompt: String,
        raw: Option<String>,
        partial: Option<String>,
        #[source]
        source: Box<RoundtableError>,
    },

    /// The model returned empty output, non-JSON output, or a payload that
    /// does not match the requested schema
    #[error("{stage} returned malformed structured output: {reason}")]
    StructuredOutput {
        stage: String,
        prompt: String,
        raw: String,
        reason: String,
    },

    /// Tool registration or execution errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// Agent id not present in the roster
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Message id not present in the conversation
    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    /// Persistence backend errors
    #[error("Store error: {0}")]
    Store(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Roundtable operations
pub type Result<T> = std::result::Result<T, RoundtableError>;

impl RoundtableError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Wrap a failure with the stage that issued the call and the prompt it sent
    pub fn at_stage(
        stage: impl Into<String>,
        prompt: impl Into<String>,
        partial: Option<String>,
        error: RoundtableError,
    ) -> Self {
        // Structured-output failures already carry the stage and raw text.
        if matches!(error, Self::StructuredOutput { .. } | Self::MissingCredential { .. }) {
            return error;
        }
        Self::Stage {
            stage: stage.into(),
            prompt: prompt.into(),
            raw: None,
            partial: partial.filter(|p| !p.is_empty()),
            source: Box::new(error),
        }
    }

    /// Build a malformed-output error
    pub fn structured(
        stage: impl Into<String>,
        prompt: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StructuredOutput {
            stage: stage.into(),
            prompt: prompt.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Prompt that was sent when this error happened, if known
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::Stage { prompt, .. } | Self::StructuredOutput { prompt, .. } => Some(prompt),
            _ => None,
        }
    }

    /// Text accumulated before the failure, if any
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            Self::Stage { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }

    /// Raw model output attached to the error, if any
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Stage { raw, .. } => raw.as_deref(),
            Self::StructuredOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
