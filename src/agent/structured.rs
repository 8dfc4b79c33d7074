//! Single-shot structured generation
//!
//! Shared by the turn manager, moderator, planner and memory extraction.
//! One request is sent per invocation and never retried: an empty reply or
//! a reply that is not valid JSON becomes `RoundtableError::StructuredOutput`
//! carrying the prompt and the raw text. Retrying is the caller's decision.

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::agent::pipeline::PipelineTrace;
use crate::core::{Result, RoundtableError};
use crate::llm::{Content, GenerateRequest, LLMProvider};

/// One structured call to the Agent Manager's model
#[derive(Debug, Clone)]
pub struct StructuredCall<'a> {
    pub stage: &'a str,
    pub model: &'a str,
    pub system_instruction: &'a str,
    pub prompt: String,
    /// Response schema; `None` asks for free-form JSON
    pub schema: Option<Value>,
    pub api_key: Option<&'a str>,
}

/// Parsed reply plus the raw text it came from
#[derive(Debug, Clone)]
pub struct StructuredReply {
    pub stage: String,
    pub prompt: String,
    pub raw: String,
    pub value: Value,
}

impl StructuredReply {
    /// Deserialize the reply; a shape mismatch is reported like a parse failure
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| self.malformed(e.to_string()))
    }

    /// Build a malformed-output error for this reply
    pub fn malformed(&self, reason: impl Into<String>) -> RoundtableError {
        RoundtableError::structured(&self.stage, &self.prompt, &self.raw, reason)
    }
}

/// Issue the call, record it on the trace and parse the reply as JSON
pub async fn call_structured(
    provider: &dyn LLMProvider,
    call: StructuredCall<'_>,
    trace: &mut PipelineTrace,
) -> Result<StructuredReply> {
    let api_key = call
        .api_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| RoundtableError::MissingCredential {
            stage: call.stage.to_string(),
        })?;

    let mut request = GenerateRequest::new(
        call.model,
        vec![Content::user_text(call.prompt.clone())],
        api_key,
    )
    .with_system_instruction(call.system_instruction)
    .with_temperature(0.0);
    request = match call.schema {
        Some(schema) => request.with_response_schema(schema),
        None => request.with_json_output(),
    };

    let started = Instant::now();
    let response = provider
        .generate(&request)
        .await
        .map_err(|e| RoundtableError::at_stage(call.stage, call.prompt.clone(), None, e))?;
    trace.record(
        call.stage,
        call.prompt.clone(),
        response.text.clone(),
        Some(started.elapsed()),
    );

    let raw = response.text;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RoundtableError::structured(
            call.stage,
            call.prompt,
            raw,
            "empty output",
        ));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(StructuredReply {
            stage: call.stage.to_string(),
            prompt: call.prompt,
            raw,
            value,
        }),
        Err(e) => Err(RoundtableError::structured(
            call.stage,
            call.prompt,
            raw,
            format!("invalid JSON: {}", e),
        )),
    }
}

/// Deserialize a field that may be `null` but must be present.
///
/// Used with `#[serde(deserialize_with = "required_nullable")]` and no
/// `default`, so a missing key fails instead of becoming `None`.
pub fn required_nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}
