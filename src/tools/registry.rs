//! Tool registry - validates, exposes and dispatches tool calls
//!
//! Declarations are checked once when a tool is registered. Calls are
//! dispatched by name and every outcome comes back as a `ToolResult`, so a
//! failing tool never aborts the turn.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::{Result, RoundtableError, ToolCall, ToolDefinition, ToolResult};
use crate::tools::{Tool, ToolContext, ToolHandler};

struct Registered {
    tool: Tool,
    definition: ToolDefinition,
    required: Vec<String>,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in tool
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in Tool::builtins() {
            // Built-in declarations are static and known to be valid.
            if let Err(e) = registry.register(tool) {
                warn!("skipping built-in tool: {}", e);
            }
        }
        registry
    }

    /// Register a tool after validating its declaration
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        let definition = tool.definition();
        let required = validate_definition(&definition)?;

        if self.tools.contains_key(&definition.name) {
            return Err(RoundtableError::tool(format!(
                "tool '{}' is already registered",
                definition.name
            )));
        }

        debug!(tool = %definition.name, "registered tool");
        self.tools.insert(
            definition.name.clone(),
            Registered {
                tool,
                definition,
                required,
            },
        );
        Ok(())
    }

    /// Check whether a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions, sorted by name
    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|r| r.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Declarations for the tools an agent is permitted to use, in the
    /// agent's order. Unknown names are skipped.
    pub fn definitions_for(&self, permitted: &[String]) -> Vec<ToolDefinition> {
        permitted
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|r| r.definition.clone())
            .collect()
    }

    /// Execute a tool call
    pub fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(entry) = self.tools.get(&call.name) else {
            return ToolResult::failure(&call.name, format!("Unknown tool: {}", call.name));
        };

        if let Some(missing) = entry
            .required
            .iter()
            .find(|key| call.arguments.get(key.as_str()).is_none())
        {
            return ToolResult::failure(
                &call.name,
                format!("missing required argument '{}'", missing),
            );
        }

        match entry.tool.call(&call.arguments, ctx) {
            Ok(value) => ToolResult::success(&call.name, value),
            Err(message) => {
                debug!(tool = %call.name, error = %message, "tool returned error");
                ToolResult::failure(&call.name, message)
            }
        }
    }

    /// Execute a batch of calls concurrently. Results come back in call order.
    pub async fn execute_all(
        self: &Arc<Self>,
        calls: &[ToolCall],
        ctx: Arc<ToolContext>,
    ) -> Vec<ToolResult> {
        let mut set: JoinSet<(usize, ToolResult)> = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            let registry = Arc::clone(self);
            let ctx = Arc::clone(&ctx);
            let call = call.clone();
            set.spawn(async move { (index, registry.execute(&call, &ctx)) });
        }

        let mut results: Vec<Option<ToolResult>> = vec![None; calls.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!("tool task failed to join: {}", e),
            }
        }

        results
            .into_iter()
            .zip(calls)
            .map(|(result, call)| {
                result.unwrap_or_else(|| ToolResult::failure(&call.name, "tool task panicked"))
            })
            .collect()
    }
}

/// Validate a declaration and return its required argument names
fn validate_definition(definition: &ToolDefinition) -> Result<Vec<String>> {
    let invalid = |reason: &str| {
        RoundtableError::tool(format!(
            "invalid declaration for '{}': {}",
            definition.name, reason
        ))
    };

    if definition.name.is_empty()
        || !definition
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("name must be non-empty [A-Za-z0-9_-]"));
    }

    let params = &definition.parameters;
    if params.get("type").and_then(Value::as_str) != Some("object") {
        return Err(invalid("parameters must be an object schema"));
    }

    let properties = match params.get("properties") {
        Some(Value::Object(map)) => Some(map),
        None => None,
        Some(_) => return Err(invalid("properties must be an object")),
    };

    let required = match params.get("required") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("required entries must be strings"))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("required must be an array")),
    };

    for key in &required {
        if !properties.is_some_and(|p| p.contains_key(key)) {
            return Err(invalid(&format!("required key '{}' is not a declared property", key)));
        }
    }

    Ok(required)
}
