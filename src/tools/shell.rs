//! Sandboxed shell emulation
//!
//! Runs a handful of commands against an in-memory directory tree. Nothing
//! touches the real filesystem or spawns a process. The current directory
//! lives as long as the tool instance.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::ToolDefinition;
use crate::tools::calculator::{self, CalcError};
use crate::tools::{ToolContext, ToolHandler};

/// A node of the in-memory tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    File(String),
    Dir(BTreeMap<String, Node>),
}

impl Node {
    pub fn dir() -> Self {
        Node::Dir(BTreeMap::new())
    }

    /// Builder helper: add a child entry
    pub fn with(mut self, name: &str, child: Node) -> Self {
        if let Node::Dir(ref mut entries) = self {
            entries.insert(name.to_string(), child);
        }
        self
    }

    pub fn file(content: &str) -> Self {
        Node::File(content.to_string())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ShellError {
    #[error("{0}: missing operand")]
    MissingOperand(&'static str),
    #[error("{cmd}: {path}: No such file or directory")]
    NotFound { cmd: &'static str, path: String },
    #[error("{cmd}: {path}: Not a directory")]
    NotADirectory { cmd: &'static str, path: String },
    #[error("{cmd}: {path}: Is a directory")]
    IsADirectory { cmd: &'static str, path: String },
    #[error("calc: {0}")]
    Calc(#[from] CalcError),
    #[error("{0}: command not found")]
    UnknownCommand(String),
}

/// Shell state: the tree plus a current-directory cursor
#[derive(Debug, Clone)]
pub struct Shell {
    root: Node,
    cwd: Vec<String>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(default_tree())
    }
}

/// Tree every new shell starts from
pub fn default_tree() -> Node {
    Node::dir()
        .with(
            "documents",
            Node::dir()
                .with("report.txt", Node::file("Q3 report: revenue up 12%."))
                .with("ideas.md", Node::file("- agent memory viewer\n- plan replay")),
        )
        .with(
            "projects",
            Node::dir().with(
                "roundtable",
                Node::dir().with("README.md", Node::file("# Roundtable\nMulti-agent chat.")),
            ),
        )
        .with("notes.txt", Node::file("Remember to water the plants."))
}

impl Shell {
    pub fn new(root: Node) -> Self {
        Self {
            root,
            cwd: Vec::new(),
        }
    }

    /// Current directory as an absolute path
    pub fn pwd(&self) -> String {
        format!("/{}", self.cwd.join("/"))
    }

    /// Run one command line
    pub fn run(&mut self, line: &str) -> Result<String, ShellError> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "pwd" => Ok(self.pwd()),
            "echo" => Ok(rest.to_string()),
            "cd" => self.cd(rest),
            "ls" => self.ls(rest),
            "cat" => self.cat(rest),
            "calc" => {
                if rest.is_empty() {
                    return Err(ShellError::MissingOperand("calc"));
                }
                let value = calculator::evaluate(rest)?;
                Ok(calculator::number_to_json(value).to_string())
            }
            other => Err(ShellError::UnknownCommand(other.to_string())),
        }
    }

    fn cd(&mut self, path: &str) -> Result<String, ShellError> {
        let target = if path.is_empty() {
            Vec::new()
        } else {
            self.resolve(path)
        };
        match self.node(&target) {
            Some(Node::Dir(_)) => {
                self.cwd = target;
                Ok(String::new())
            }
            Some(Node::File(_)) => Err(ShellError::NotADirectory {
                cmd: "cd",
                path: path.to_string(),
            }),
            None => Err(ShellError::NotFound {
                cmd: "cd",
                path: path.to_string(),
            }),
        }
    }

    fn ls(&self, path: &str) -> Result<String, ShellError> {
        let target = if path.is_empty() {
            self.cwd.clone()
        } else {
            self.resolve(path)
        };
        match self.node(&target) {
            Some(Node::Dir(entries)) => Ok(entries
                .iter()
                .map(|(name, node)| match node {
                    Node::Dir(_) => format!("{}/", name),
                    Node::File(_) => name.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n")),
            Some(Node::File(_)) => Ok(target.last().cloned().unwrap_or_default()),
            None => Err(ShellError::NotFound {
                cmd: "ls",
                path: path.to_string(),
            }),
        }
    }

    fn cat(&self, path: &str) -> Result<String, ShellError> {
        if path.is_empty() {
            return Err(ShellError::MissingOperand("cat"));
        }
        match self.node(&self.resolve(path)) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir(_)) => Err(ShellError::IsADirectory {
                cmd: "cat",
                path: path.to_string(),
            }),
            None => Err(ShellError::NotFound {
                cmd: "cat",
                path: path.to_string(),
            }),
        }
    }

    /// Turn a path into absolute components, applying `.` and `..`
    fn resolve(&self, path: &str) -> Vec<String> {
        let mut parts = if path.starts_with('/') {
            Vec::new()
        } else {
            self.cwd.clone()
        };
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                name => parts.push(name.to_string()),
            }
        }
        parts
    }

    fn node(&self, path: &[String]) -> Option<&Node> {
        let mut current = &self.root;
        for component in path {
            match current {
                Node::Dir(entries) => current = entries.get(component)?,
                Node::File(_) => return None,
            }
        }
        Some(current)
    }
}

/// The `shell` tool
#[derive(Debug, Default)]
pub struct ShellTool {
    shell: Mutex<Shell>,
}

impl ShellTool {
    pub fn new(shell: Shell) -> Self {
        Self {
            shell: Mutex::new(shell),
        }
    }

    pub fn pwd(&self) -> String {
        self.shell.lock().pwd()
    }
}

impl ToolHandler for ShellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "shell",
            "Run a command in a sandboxed shell with an in-memory filesystem. \
             Supported: ls [path], cat <path>, pwd, cd <path>, echo <text>, calc <expr>",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command line to run"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    fn call(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| "command must be a string".to_string())?;

        self.shell
            .lock()
            .run(command)
            .map(Value::String)
            .map_err(|e| e.to_string())
    }
}
