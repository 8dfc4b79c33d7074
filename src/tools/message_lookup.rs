//! Message text retrieval
//!
//! Lets an agent read the full text of an earlier message when only its
//! summary is in view.

use serde_json::{json, Value};

use crate::core::ToolDefinition;
use crate::tools::{ToolContext, ToolHandler};

/// The `get_message_text` tool
#[derive(Debug, Clone, Default)]
pub struct MessageLookup;

impl ToolHandler for MessageLookup {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "get_message_text",
            "Fetch the full text of an earlier conversation message by its id",
            json!({
                "type": "object",
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "Id of the message to read"
                    }
                },
                "required": ["message_id"]
            }),
        )
    }

    fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value, String> {
        let id = args
            .get("message_id")
            .and_then(Value::as_str)
            .ok_or_else(|| "message_id must be a string".to_string())?;

        ctx.history
            .iter()
            .find(|m| m.id == id)
            .map(|m| {
                json!({
                    "id": m.id,
                    "sender": m.sender.to_string(),
                    "text": m.text,
                })
            })
            .ok_or_else(|| format!("no message with id '{}'", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;

    #[test]
    fn test_lookup_by_id() {
        let message = Message::agent("coder", "the long answer");
        let ctx = ToolContext::new(vec![Message::user("q"), message.clone()]);

        let found = MessageLookup
            .call(&json!({"message_id": message.id}), &ctx)
            .unwrap();
        assert_eq!(found["text"], "the long answer");
        assert_eq!(found["sender"], "coder");

        assert!(MessageLookup
            .call(&json!({"message_id": "missing"}), &ctx)
            .is_err());
    }
}
