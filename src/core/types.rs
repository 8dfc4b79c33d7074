//! Shared types used across Roundtable modules
//!
//! Contains messages, agents, trace records, plans and tool definitions.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sender {
    /// The human participant
    User,
    /// Notices injected by the application itself
    System,
    /// A roster agent, by id
    Agent(String),
}

impl Sender {
    pub const USER: &'static str = "user";
    pub const SYSTEM: &'static str = "system";

    /// Agent id, if an agent sent this
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Sender::Agent(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Sender::User)
    }
}

impl From<String> for Sender {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::USER => Sender::User,
            Self::SYSTEM => Sender::System,
            _ => Sender::Agent(value),
        }
    }
}

impl From<Sender> for String {
    fn from(value: Sender) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => f.write_str(Sender::USER),
            Sender::System => f.write_str(Sender::SYSTEM),
            Sender::Agent(id) => f.write_str(id),
        }
    }
}

/// Inline file attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Base64-encoded payload
    pub data: String,
    /// MIME type of the payload
    pub mime_type: String,
}

impl Attachment {
    /// Create an attachment from already-encoded data
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Encode raw bytes into an attachment
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }
}

/// An alternative answer produced by regenerating an agent message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageVariant {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    /// Short self-summary produced after generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
    /// Set while the text is still streaming in
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<MessageVariant>,
    /// Diagnostic trace of the calls that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<PipelineStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub bookmarked: bool,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
            summary: None,
            attachment: None,
            timestamp: Utc::now(),
            streaming: false,
            variants: Vec::new(),
            pipeline: None,
            plan: None,
            edited: false,
            bookmarked: false,
        }
    }

    /// Create a new user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Create a new agent message
    pub fn agent(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Sender::Agent(agent_id.into()), text)
    }

    /// Create a new system notice
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    /// Attach a file to the message
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Summary if one exists, otherwise the full text
    pub fn summary_or_text(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.text)
    }
}

/// A conversation participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    pub model: String,
    #[serde(default)]
    pub system_instruction: String,
    /// Per-agent credential, overriding the default API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Background knowledge injected into the system instruction
    #[serde(default)]
    pub knowledge: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Names of the tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Agent {
    /// Create an enabled agent with no tools
    pub fn new(id: impl Into<String>, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            job_title: String::new(),
            job_description: String::new(),
            goals: Vec::new(),
            specializations: Vec::new(),
            model: model.into(),
            system_instruction: String::new(),
            api_key: None,
            knowledge: String::new(),
            enabled: true,
            tools: Vec::new(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_job(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.job_title = title.into();
        self.job_description = description.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_knowledge(mut self, knowledge: impl Into<String>) -> Self {
        self.knowledge = knowledge.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// One-line description used in roster listings for the manager
    pub fn describe(&self) -> String {
        let mut line = format!("- id: {} | name: {}", self.id, self.name);
        if !self.job_title.is_empty() {
            line.push_str(&format!(" | role: {}", self.job_title));
        }
        if !self.job_description.is_empty() {
            line.push_str(&format!(" | does: {}", self.job_description));
        }
        if !self.specializations.is_empty() {
            line.push_str(&format!(
                " | specializations: {}",
                self.specializations.join(", ")
            ));
        }
        if !self.goals.is_empty() {
            line.push_str(&format!(" | goals: {}", self.goals.join(", ")));
        }
        line
    }
}

/// Pseudo-agent that handles turn selection, moderation, planning,
/// summarization and titles. Never a conversation participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManager {
    pub model: String,
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl AgentManager {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: String::new(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// One recorded stage of a generation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub stage: String,
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One step of a multi-agent plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub agent_id: String,
    pub task: String,
    #[serde(default)]
    pub rationale: String,
}

/// Ordered plan produced by the planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub rationale: String,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Function declaration exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new function declaration
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Whether the execution was successful
    pub success: bool,
    /// Result payload on success, error text on failure
    pub data: serde_json::Value,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            data,
        }
    }

    /// Create a failed result
    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            data: serde_json::Value::String(error.into()),
        }
    }

    /// Uniform response object fed back to the model:
    /// `{"result": ...}` or `{"error": "..."}`
    pub fn to_response(&self) -> serde_json::Value {
        if self.success {
            serde_json::json!({ "result": self.data })
        } else {
            serde_json::json!({ "error": self.data })
        }
    }
}
