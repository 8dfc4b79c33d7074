//! Hosted generation API client
//!
//! Async HTTP client for the `generateContent` / `streamGenerateContent`
//! endpoints, with function calling, JSON-schema output and SSE streaming.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Result, RoundtableError, ToolCall, ToolDefinition};
use crate::llm::content::{Content, Part};
use crate::llm::traits::{
    GenerateRequest, LLMProvider, LLMResponse, StreamCallback, TokenUsage,
};

/// Client for the hosted generation API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

/// Request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [ToolDefinition],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a serde_json::Value>,
}

/// Response body (also the shape of each streamed event)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    error: Option<WireError>,
}

/// Error object the API sends in place of (or in the middle of) a response
#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl WireResponse {
    /// Parse one body or stream event. Unparseable payloads and error
    /// objects are errors, never skipped.
    fn parse(payload: &str) -> Result<Self> {
        let response: Self = serde_json::from_str(payload).map_err(|e| {
            RoundtableError::provider(format!("Failed to parse response: {}: {}", e, payload))
        })?;
        match response.error {
            Some(error) => Err(RoundtableError::provider(format!(
                "API error ({} {}): {}",
                error.code.map(|c| c.to_string()).unwrap_or_default(),
                error.status.unwrap_or_default(),
                error.message
            ))),
            None => Ok(response),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}

/// Splits a server-sent-event byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line is available, so UTF-8 sequences and
/// events split across network chunks are reassembled.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = Self::payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush whatever is left once the stream ends
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        Self::payload(&rest)
    }

    fn payload(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        let data = line.strip_prefix("data:")?.trim();
        (!data.is_empty() && data != "[DONE]").then(|| data.to_string())
    }
}

/// Accumulates one response across stream events
#[derive(Debug, Default)]
struct ResponseAccumulator {
    text: String,
    function_calls: Vec<ToolCall>,
    usage: Option<TokenUsage>,
    model: Option<String>,
}

impl ResponseAccumulator {
    fn absorb(&mut self, response: WireResponse, on_token: Option<&StreamCallback<'_>>) {
        if let Some(version) = response.model_version {
            self.model = Some(version);
        }
        if let Some(usage) = response.usage_metadata {
            self.usage = Some(usage.into());
        }

        // Only the first candidate is used.
        let Some(content) = response.candidates.into_iter().next().and_then(|c| c.content) else {
            return;
        };

        for part in content.parts {
            match part {
                Part::Text { text } if !text.is_empty() => {
                    if let Some(callback) = on_token {
                        callback(&text);
                    }
                    self.text.push_str(&text);
                }
                Part::FunctionCall { function_call } => {
                    let arguments = if function_call.args.is_null() {
                        serde_json::json!({})
                    } else {
                        function_call.args
                    };
                    self.function_calls
                        .push(ToolCall::new(function_call.name, arguments));
                }
                _ => {}
            }
        }
    }

    fn finish(self, requested_model: &str) -> LLMResponse {
        LLMResponse {
            text: self.text,
            function_calls: self.function_calls,
            usage: self.usage,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
        }
    }
}

impl GeminiClient {
    /// Create a new client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        if stream {
            format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            )
        } else {
            format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
        }
    }

    fn wire_request(request: &GenerateRequest) -> WireRequest<'_> {
        let config = &request.config;

        let tools = if config.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: &config.tools,
            }]
        };

        let wants_json = config.json_output || config.response_schema.is_some();
        let generation_config = if config.temperature.is_some() || wants_json {
            Some(WireGenerationConfig {
                temperature: config.temperature,
                response_mime_type: wants_json.then_some("application/json"),
                response_schema: config.response_schema.as_ref(),
            })
        } else {
            None
        };

        WireRequest {
            contents: &request.contents,
            system_instruction: config
                .system_instruction
                .as_ref()
                .map(|s| Content::instruction(s.clone())),
            tools,
            generation_config,
        }
    }

    async fn send(&self, request: &GenerateRequest, stream: bool) -> Result<reqwest::Response> {
        let body = Self::wire_request(request);
        debug!(
            model = %request.model,
            stream,
            contents = request.contents.len(),
            tools = request.config.tools.len(),
            "sending generation request"
        );

        let response = self
            .client
            .post(self.endpoint(&request.model, stream))
            .header("x-goog-api-key", &request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RoundtableError::provider(format!(
                        "Cannot connect to generation API at {}",
                        self.base_url
                    ))
                } else {
                    RoundtableError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RoundtableError::provider(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse> {
        let response = self.send(request, false).await?;
        let body = response.text().await?;

        let wire = WireResponse::parse(&body)?;

        let mut acc = ResponseAccumulator::default();
        acc.absorb(wire, None);
        Ok(acc.finish(&request.model))
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        on_token: &StreamCallback<'_>,
    ) -> Result<LLMResponse> {
        let response = self.send(request, true).await?;

        let mut acc = ResponseAccumulator::default();
        let mut decoder = SseDecoder::default();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RoundtableError::provider(format!("Stream error: {}", e)))?;
            for payload in decoder.push(&chunk) {
                acc.absorb(WireResponse::parse(&payload)?, Some(on_token));
            }
        }

        if let Some(payload) = decoder.finish() {
            acc.absorb(WireResponse::parse(&payload)?, Some(on_token));
        }

        Ok(acc.finish(&request.model))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
