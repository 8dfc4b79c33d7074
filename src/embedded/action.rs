//! Extension messages and action dispatch
//!
//! The page side talks to its host through five JSON messages. Every
//! reply carries either a JSON result or an error string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::parser::{ActionCommand, ActionKind};

/// Message sent to the host extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionRequest {
    ExecuteAction(ActionCommand),
    SaveContext(Map<String, Value>),
    LoadContext,
    InjectScript { script: String },
    GetStatus,
}

impl ExtensionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ExtensionRequest::ExecuteAction(_) => "EXECUTE_ACTION",
            ExtensionRequest::SaveContext(_) => "SAVE_CONTEXT",
            ExtensionRequest::LoadContext => "LOAD_CONTEXT",
            ExtensionRequest::InjectScript { .. } => "INJECT_SCRIPT",
            ExtensionRequest::GetStatus => "GET_STATUS",
        }
    }
}

/// Reply to an [`ExtensionRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtensionResponse {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<Value, String>> for ExtensionResponse {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(e),
        }
    }
}

/// Something that can perform page actions
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform one action directly
    async fn execute(&self, command: &ActionCommand) -> Result<Value, String>;

    /// Run a script in the page
    async fn inject_script(&self, script: &str) -> Result<Value, String>;

    /// Short name for logs
    fn name(&self) -> &str {
        "executor"
    }
}

/// Script equivalent of an action, used when direct dispatch fails.
/// Context actions never leave the session, so they have none.
pub fn fallback_script(command: &ActionCommand) -> Option<String> {
    let quoted = |key: &str| Value::String(command.param(key).unwrap_or_default().to_string());

    match command.action {
        ActionKind::ClickButton => Some(format!(
            "document.querySelector({}).click();",
            quoted("selector")
        )),
        ActionKind::InsertText => Some(format!(
            "(() => {{ const el = document.querySelector({}); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); }})();",
            quoted("selector"),
            quoted("text")
        )),
        ActionKind::RunCode => command.param("code").map(str::to_string),
        ActionKind::InjectScript => command.param("script").map(str::to_string),
        ActionKind::SaveContext | ActionKind::LoadContext => None,
    }
}

/// Result value for actions that produce nothing
pub fn done(action: ActionKind) -> Value {
    json!({ "action": action.as_str(), "done": true })
}
