//! Provider content format
//!
//! Role-tagged content blocks made of parts, and the conversion from
//! conversation history into that format.

use serde::{Deserialize, Serialize};

use crate::core::{Agent, Attachment, Message, Sender, ToolCall};

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";

/// One role-tagged block of the content array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            role: role.into(),
            parts,
        }
    }

    /// A user block holding a single text part
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(ROLE_USER, vec![Part::text(text)])
    }

    /// A block with no role, as used for system instructions
    pub fn instruction(text: impl Into<String>) -> Self {
        Self::new(String::new(), vec![Part::text(text)])
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

/// Inline binary payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Tool output handed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

/// A single part of a content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    /// Part kinds this crate does not interpret
    Other(serde_json::Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn attachment(attachment: &Attachment) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: attachment.mime_type.clone(),
                data: attachment.data.clone(),
            },
        }
    }

    pub fn function_call(call: &ToolCall) -> Self {
        Part::FunctionCall {
            function_call: FunctionCall {
                name: call.name.clone(),
                args: call.arguments.clone(),
            },
        }
    }

    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Part::FunctionResponse {
            function_response: FunctionResponse {
                name: name.into(),
                response,
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Append a block, folding it into the previous one when both share a role
pub fn push_merged(contents: &mut Vec<Content>, content: Content) {
    match contents.last_mut() {
        Some(last) if last.role == content.role => last.parts.extend(content.parts),
        _ => contents.push(content),
    }
}

/// Convert conversation history into the provider's content array.
///
/// User messages map to the user role and agent messages to the model role.
/// Messages from agents other than `responder_id` are prefixed with the
/// author's name so the responder can tell speakers apart. System notices
/// are not sent. Strictly adjacent entries of the same role are merged;
/// order is preserved.
pub fn history_to_contents(history: &[Message], responder_id: &str, roster: &[Agent]) -> Vec<Content> {
    let mut contents = Vec::new();

    for message in history {
        let (role, text) = match &message.sender {
            Sender::System => continue,
            Sender::User => (ROLE_USER, message.text.clone()),
            Sender::Agent(id) if id == responder_id => (ROLE_MODEL, message.text.clone()),
            Sender::Agent(id) => {
                let name = roster
                    .iter()
                    .find(|a| &a.id == id)
                    .map(|a| a.name.as_str())
                    .unwrap_or(id.as_str());
                (ROLE_MODEL, format!("[{}]: {}", name, message.text))
            }
        };

        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
        if let Some(ref attachment) = message.attachment {
            parts.push(Part::attachment(attachment));
        }
        if parts.is_empty() {
            continue;
        }

        push_merged(&mut contents, Content::new(role, parts));
    }

    contents
}
