//! LLM Provider trait for abstracting the hosted generation backend
//!
//! Every call is single-shot: providers never retry, callers decide.

use async_trait::async_trait;

use crate::core::{Result, ToolCall, ToolDefinition};
use crate::llm::content::Content;

/// Per-call generation settings
#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    /// System instruction text
    pub system_instruction: Option<String>,
    /// Function declarations the model may call
    pub tools: Vec<ToolDefinition>,
    /// Strict JSON schema for the response; implies JSON output
    pub response_schema: Option<serde_json::Value>,
    /// Ask for JSON output without a schema
    pub json_output: bool,
    /// Temperature for sampling (0.0 - 2.0)
    pub temperature: Option<f32>,
}

/// One generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub config: GenerationConfig,
    /// Credential sent with this call
    pub api_key: String,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Content>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents,
            config: GenerationConfig::default(),
            api_key: api_key.into(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        self.config.system_instruction = (!instruction.is_empty()).then_some(instruction);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.config.response_schema = Some(schema);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.config.json_output = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// Text content of the response
    pub text: String,
    /// Function calls the model wants to make
    pub function_calls: Vec<ToolCall>,
    /// Token usage information
    pub usage: Option<TokenUsage>,
    /// Model that generated the response
    pub model: String,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Callback invoked with each streamed text fragment
pub type StreamCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Trait for generation backends
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a complete response in one call
    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse>;

    /// Generate a streamed response, forwarding each text fragment to `on_token`
    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        on_token: &StreamCallback<'_>,
    ) -> Result<LLMResponse>;

    /// Get the provider name
    fn name(&self) -> &str;
}
