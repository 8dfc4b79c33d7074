//! Action executor backed by the agent-browser CLI
//!
//! Each action maps onto one agent-browser command run against a named
//! session, so several pages can be driven side by side.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use super::action::{done, ActionExecutor};
use super::parser::{ActionCommand, ActionKind};

const PROGRAM: &str = "agent-browser";

/// Drives a browser session through `agent-browser`
pub struct CliExecutor {
    session_name: String,
    headed: bool,
}

impl CliExecutor {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            headed: false,
        }
    }

    pub fn headed(mut self, headed: bool) -> Self {
        self.headed = headed;
        self
    }

    /// Check if agent-browser is installed
    pub async fn is_available() -> bool {
        Command::new(PROGRAM)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Command line for an action; context actions have no CLI form
    pub fn args_for(command: &ActionCommand) -> Result<Vec<String>, String> {
        let required = |key: &str| {
            command
                .param(key)
                .map(str::to_string)
                .ok_or_else(|| format!("{} needs a '{}' parameter", command.action.as_str(), key))
        };

        match command.action {
            ActionKind::ClickButton => Ok(vec!["click".into(), required("selector")?]),
            ActionKind::InsertText => Ok(vec![
                "fill".into(),
                required("selector")?,
                required("text")?,
            ]),
            ActionKind::RunCode => Ok(vec!["eval".into(), required("code")?]),
            ActionKind::InjectScript => Ok(vec!["eval".into(), required("script")?]),
            ActionKind::SaveContext | ActionKind::LoadContext => Err(format!(
                "{} is handled by the page session",
                command.action.as_str()
            )),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, String> {
        let mut cmd = Command::new(PROGRAM);
        cmd.args(["--session", &self.session_name]);
        if self.headed {
            cmd.arg("--headed");
        }
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(session = %self.session_name, ?args, "running agent-browser");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                "agent-browser not found. Install with: npm install -g agent-browser".to_string()
            } else {
                format!("Failed to run agent-browser: {}", e)
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(format!(
                "agent-browser command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    fn output_value(action: ActionKind, stdout: String) -> Value {
        if stdout.is_empty() {
            return done(action);
        }
        serde_json::from_str(&stdout).unwrap_or_else(|_| json!({ "output": stdout }))
    }
}

#[async_trait]
impl ActionExecutor for CliExecutor {
    async fn execute(&self, command: &ActionCommand) -> Result<Value, String> {
        let args = Self::args_for(command)?;
        let stdout = self.run(&args).await?;
        Ok(Self::output_value(command.action, stdout))
    }

    async fn inject_script(&self, script: &str) -> Result<Value, String> {
        let stdout = self.run(&["eval".to_string(), script.to_string()]).await?;
        Ok(Self::output_value(ActionKind::InjectScript, stdout))
    }

    fn name(&self) -> &str {
        PROGRAM
    }
}
