//! Tools module - functions the model can call during generation
//!
//! Contains the built-in tools and the registry that validates and
//! dispatches them.

pub mod calculator;
pub mod message_lookup;
pub mod registry;
pub mod shell;
pub mod weather;

use serde_json::Value;

use crate::core::{Message, ToolDefinition};

pub use calculator::Calculator;
pub use message_lookup::MessageLookup;
pub use registry::ToolRegistry;
pub use shell::{Shell, ShellTool};
pub use weather::WeatherLookup;

/// State a tool may read while running
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Conversation history at the time of the call
    pub history: Vec<Message>,
}

impl ToolContext {
    pub fn new(history: Vec<Message>) -> Self {
        Self { history }
    }
}

/// Uniform capability interface implemented by every tool kind
pub trait ToolHandler: Send + Sync {
    /// Declaration exposed to the model
    fn definition(&self) -> ToolDefinition;

    /// Run the tool; `Err` carries a message for the model
    fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value, String>;
}

/// The fixed set of tool kinds
#[derive(Debug)]
pub enum Tool {
    Calculator(Calculator),
    Weather(WeatherLookup),
    Shell(ShellTool),
    MessageLookup(MessageLookup),
}

impl Tool {
    fn handler(&self) -> &dyn ToolHandler {
        match self {
            Tool::Calculator(t) => t,
            Tool::Weather(t) => t,
            Tool::Shell(t) => t,
            Tool::MessageLookup(t) => t,
        }
    }

    /// All built-in tools, each with fresh state
    pub fn builtins() -> Vec<Tool> {
        vec![
            Tool::Calculator(Calculator),
            Tool::Weather(WeatherLookup),
            Tool::Shell(ShellTool::default()),
            Tool::MessageLookup(MessageLookup),
        ]
    }
}

impl ToolHandler for Tool {
    fn definition(&self) -> ToolDefinition {
        self.handler().definition()
    }

    fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value, String> {
        self.handler().call(args, ctx)
    }
}
