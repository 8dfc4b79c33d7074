//! Long-term conversation memory
//!
//! A free-form map of facts owned by a conversation. Updates are merged in,
//! never replacing the whole map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Facts remembered across turns of one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongTermMemory {
    facts: Map<String, Value>,
}

impl LongTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build memory from a JSON object; anything else yields empty memory
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(facts) => Self { facts },
            _ => Self::default(),
        }
    }

    /// Merge an update into memory. Objects merge recursively; any other
    /// value in the update overrides what was stored.
    pub fn merge(&mut self, update: &Map<String, Value>) {
        for (key, value) in update {
            match self.facts.get_mut(key) {
                Some(existing) => merge_values(existing, value),
                None => {
                    self.facts.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Merge a JSON value; non-object updates are ignored
    pub fn merge_value(&mut self, update: &Value) -> bool {
        match update {
            Value::Object(map) => {
                self.merge(map);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.facts
    }

    /// Pretty JSON dump used inside system instructions
    pub fn to_prompt_block(&self) -> String {
        serde_json::to_string_pretty(&self.facts).unwrap_or_else(|_| "{}".to_string())
    }
}

fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
