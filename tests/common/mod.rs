//! Shared helpers for integration tests
//!
//! `ScriptedProvider` replays queued replies in order and records every
//! request, so tests can run whole turns without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use roundtable::agent::{Orchestrator, TurnEvent};
use roundtable::core::{Agent, Config, Result, RoundtableError, ToolCall};
use roundtable::llm::{GenerateRequest, LLMProvider, LLMResponse, StreamCallback, TokenUsage};

enum Step {
    Reply { chunks: Vec<String>, calls: Vec<ToolCall> },
    Fail(String),
}

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

    pub fn json(self, value: Value) -> Self {
        self.reply(&value.to_string())
    }

    pub fn chunks(self, chunks: &[&str]) -> Self {
        self.script.lock().push_back(Step::Reply {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            calls: Vec::new(),
        });
        self
    }

    pub fn call(self, name: &str, arguments: Value) -> Self {
        self.script.lock().push_back(Step::Reply {
            chunks: Vec::new(),
            calls: vec![ToolCall::new(name, arguments)],
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

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn next(&self, request: &GenerateRequest) -> Result<(Vec<String>, Vec<ToolCall>)> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(Step::Reply { chunks, calls }) => Ok((chunks, calls)),
            Some(Step::Fail(message)) => Err(RoundtableError::provider(message)),
            None => Err(RoundtableError::provider("script exhausted")),
        }
    }

    fn response(request: &GenerateRequest, chunks: Vec<String>, calls: Vec<ToolCall>) -> LLMResponse {
        LLMResponse {
            text: chunks.concat(),
            function_calls: calls,
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: request.model.clone(),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<LLMResponse> {
        let (chunks, calls) = self.next(request)?;
        Ok(Self::response(request, chunks, calls))
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
        Ok(Self::response(request, chunks, calls))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Config with a test credential and the given roster
pub fn config(agents: Vec<Agent>) -> Config {
    let mut config = Config::default();
    config.api.api_key = Some("test-key".to_string());
    config.agents = agents;
    config.store.enabled = false;
    config.orchestration.planning = false;
    config.orchestration.memory_interval = 0;
    config
}

pub fn ada() -> Agent {
    Agent::new("ada", "Ada", "gemini-test")
        .with_job("Mathematician", "works through numbers")
        .with_instruction("You are Ada.")
        .with_tools(["calculator", "shell"])
}

pub fn bob() -> Agent {
    Agent::new("bob", "Bob", "gemini-test")
        .with_job("Meteorologist", "talks about weather")
        .with_instruction("You are Bob.")
        .with_tools(["get_weather"])
}

pub fn orchestrator(config: Config, provider: &Arc<ScriptedProvider>) -> Orchestrator {
    Orchestrator::new(config, Arc::clone(provider) as Arc<dyn LLMProvider>)
}

/// Collects turn events as strings
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn record(&self, event: TurnEvent<'_>) {
        let line = match event {
            TurnEvent::Speaker { agent_id, .. } => format!("speaker:{}", agent_id),
            TurnEvent::Token(chunk) => format!("token:{}", chunk),
            TurnEvent::Waiting { rationale } => format!("waiting:{}", rationale),
        };
        self.events.lock().push(line);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// Text of every function response sent in a request
pub fn function_responses(request: &GenerateRequest) -> Vec<Value> {
    let contents = serde_json::to_value(&request.contents).unwrap_or_default();
    contents
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|c| c["parts"].as_array().cloned().unwrap_or_default())
        .filter_map(|p| p.get("functionResponse").cloned())
        .collect()
}

pub fn ignore_events(_: TurnEvent<'_>) {}
