//! Scripted in-process provider for unit tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{Result, RoundtableError, ToolCall};
use crate::llm::{GenerateRequest, LLMProvider, LLMResponse, StreamCallback};

enum Step {
    Reply { chunks: Vec<String>, calls: Vec<ToolCall> },
    Fail(String),
}

/// Replays queued replies in order and records every request
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.chunks(&[text])
    }

    pub fn chunks(self, chunks: &[&str]) -> Self {
        self.script.lock().push_back(Step::Reply {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            calls: Vec::new(),
        });
        self
    }

    pub fn calls(self, calls: Vec<ToolCall>) -> Self {
        self.script.lock().push_back(Step::Reply {
            chunks: Vec::new(),
            calls,
        });
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.script.lock().push_back(Step::Fail(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    fn next(&self, request: &GenerateRequest) -> Result<(Vec<String>, Vec<ToolCall>)> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(Step::Reply { chunks, calls }) => Ok((chunks, calls)),
            Some(Step::Fail(message)) => Err(RoundtableError::provider(message)),
            None => Err(RoundtableError::provider("script exhausted")),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse> {
        let (chunks, calls) = self.next(request)?;
        Ok(LLMResponse {
            text: chunks.concat(),
            function_calls: calls,
            usage: None,
            model: request.model.clone(),
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        on_token: &StreamCallback<'_>,
    ) -> Result<LLMResponse> {
        let (chunks, calls) = self.next(request)?;
        for chunk in &chunks {
            on_token(chunk);
        }
        Ok(LLMResponse {
            text: chunks.concat(),
            function_calls: calls,
            usage: None,
            model: request.model.clone(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
