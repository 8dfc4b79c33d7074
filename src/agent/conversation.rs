//! Conversation state
//!
//! Ordered messages plus the conversation's long-term memory, title and
//! token count. Messages keep insertion order; once finalized only the
//! edit and bookmark flags change, and regenerations are kept as variants.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{LongTermMemory, Message, MessageVariant, PipelineStep, Result, RoundtableError};

/// One conversation with its memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    messages: Vec<Message>,
    pub memory: LongTermMemory,
    /// Tokens reported by the provider across all turns
    pub token_count: u64,
    /// Topic label from the most recent topic change
    pub recent_topic: Option<String>,
    /// Oldest messages are dropped beyond this length
    max_length: usize,
}

impl Conversation {
    pub fn new(max_length: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: None,
            messages: Vec::new(),
            memory: LongTermMemory::new(),
            token_count: 0,
            recent_topic: None,
            max_length: max_length.max(1),
        }
    }

    /// Append a message and keep the size limit
    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        if self.messages.len() > self.max_length {
            let excess = self.messages.len() - self.max_length;
            self.messages.drain(..excess);
        }
        // Non-empty after a push.
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| RoundtableError::UnknownMessage(id.to_string()))
    }

    /// Position of a message in the history
    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Replace a message's text and mark it edited
    pub fn edit(&mut self, id: &str, text: impl Into<String>) -> Result<()> {
        let message = self.get_mut(id)?;
        message.text = text.into();
        message.summary = None;
        message.edited = true;
        Ok(())
    }

    /// Flip the bookmark flag, returning the new value
    pub fn toggle_bookmark(&mut self, id: &str) -> Result<bool> {
        let message = self.get_mut(id)?;
        message.bookmarked = !message.bookmarked;
        Ok(message.bookmarked)
    }

    /// Keep the current answer as a variant and show the regenerated one
    pub fn add_variant(
        &mut self,
        id: &str,
        text: impl Into<String>,
        summary: Option<String>,
        pipeline: Vec<PipelineStep>,
    ) -> Result<()> {
        let message = self.get_mut(id)?;
        message.pipeline = Some(pipeline);
        let previous = MessageVariant {
            text: std::mem::replace(&mut message.text, text.into()),
            summary: std::mem::replace(&mut message.summary, summary),
            timestamp: message.timestamp,
        };
        message.variants.push(previous);
        message.timestamp = Utc::now();
        Ok(())
    }

    /// Last `n` messages, oldest first
    pub fn last_n(&self, n: usize) -> &[Message] {
        &self.messages[self.messages.len().saturating_sub(n)..]
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.sender.is_user())
    }

    pub fn bookmarked(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.bookmarked)
    }

    /// Drop messages, memory, title and topic; keep the id
    pub fn clear(&mut self) {
        self.messages.clear();
        self.memory.clear();
        self.title = None;
        self.recent_topic = None;
        self.token_count = 0;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_basic() {
        let mut conv = Conversation::new(10);
        conv.push(Message::user("Hello"));
        conv.push(Message::agent("a", "Hi there!"));

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last_user_message().unwrap().text, "Hello");
        assert_eq!(conv.last_n(1)[0].text, "Hi there!");
        assert_eq!(conv.last_n(10).len(), 2);
    }

    #[test]
    fn test_conversation_limit() {
        let mut conv = Conversation::new(3);
        for text in ["1", "2", "3", "4"] {
            conv.push(Message::user(text));
        }

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[0].text, "2");
    }

    #[test]
    fn test_edit_and_bookmark() {
        let mut conv = Conversation::default();
        let id = conv.push(Message::user("typo")).id.clone();

        conv.edit(&id, "fixed").unwrap();
        assert!(conv.get(&id).unwrap().edited);
        assert_eq!(conv.get(&id).unwrap().text, "fixed");

        assert!(conv.toggle_bookmark(&id).unwrap());
        assert_eq!(conv.bookmarked().count(), 1);
        assert!(!conv.toggle_bookmark(&id).unwrap());

        assert!(matches!(
            conv.edit("missing", "x"),
            Err(RoundtableError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_variants_keep_previous_answer() {
        let mut conv = Conversation::default();
        let id = conv
            .push(Message::agent("a", "first").with_summary("one"))
            .id
            .clone();

        conv.add_variant(&id, "second", None, Vec::new()).unwrap();
        let message = conv.get(&id).unwrap();
        assert_eq!(message.text, "second");
        assert_eq!(message.summary, None);
        assert_eq!(message.variants.len(), 1);
        assert_eq!(message.variants[0].text, "first");
        assert_eq!(message.variants[0].summary.as_deref(), Some("one"));
    }

    #[test]
    fn test_clear_keeps_id() {
        let mut conv = Conversation::default();
        let id = conv.id.clone();
        conv.push(Message::user("x"));
        conv.title = Some("t".into());
        conv.clear();
        assert!(conv.is_empty());
        assert_eq!(conv.title, None);
        assert_eq!(conv.id, id);
    }
}
