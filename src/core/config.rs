//! Configuration management for Roundtable
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/roundtable/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::core::error::{Result, RoundtableError};
use crate::core::types::{Agent, AgentManager};

/// Main configuration for Roundtable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Generation API configuration
    pub api: ApiConfig,
    /// The Agent Manager (turn selection, moderation, planning, summaries)
    pub manager: AgentManager,
    /// Conversation participants
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Orchestration behaviour
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Streaming configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,
}

/// Hosted generation API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the generation API
    pub base_url: String,
    /// Default credential, used when an agent has none of its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// How the next speaker is chosen for each user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStrategy {
    /// Topic-continuity classifier picks the speaker
    Manager,
    /// Rule-driven moderator decides whether anyone speaks
    Moderator,
}

impl std::str::FromStr for TurnStrategy {
    type Err = RoundtableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "moderator" => Ok(Self::Moderator),
            other => Err(RoundtableError::config(format!(
                "Unknown strategy '{}'. Use 'manager' or 'moderator'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TurnStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manager => write!(f, "manager"),
            Self::Moderator => write!(f, "moderator"),
        }
    }
}

/// Orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub strategy: TurnStrategy,
    /// House rules handed to the moderator
    pub house_rules: String,
    /// Responses longer than this many UTF-16 code units get a self-summary
    pub summary_threshold: usize,
    /// Word limit requested for self-summaries
    pub summary_max_words: usize,
    /// Number of recent messages sent with each manager call
    pub context_window: usize,
    /// Rounds of tool calls allowed within one turn
    pub max_tool_rounds: usize,
    /// Run memory extraction every N messages (0 disables it)
    pub memory_interval: usize,
    /// Whether complex requests are planned across agents first
    pub planning: bool,
    /// Messages kept in a conversation before the oldest are dropped
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    1000
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            strategy: env::var("ROUNDTABLE_STRATEGY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(TurnStrategy::Manager),
            house_rules: "Only one agent speaks at a time. Let the user steer the conversation. \
                          Do not repeat what another agent already said."
                .to_string(),
            summary_threshold: 250,
            summary_max_words: 15,
            context_window: 20,
            max_tool_rounds: 3,
            memory_interval: 6,
            planning: false,
            max_history: default_max_history(),
        }
    }
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Print tokens as they arrive (vs buffering)
    pub print_tokens: bool,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Whether conversations are persisted
    pub enabled: bool,
    /// REST endpoint of the hosted database; in-memory store when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let model =
            env::var("ROUNDTABLE_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        Self {
            api: ApiConfig::default(),
            manager: AgentManager {
                model: model.clone(),
                system_instruction: "You coordinate a group of AI agents talking with a user."
                    .to_string(),
                api_key: None,
            },
            agents: vec![Agent::new("assistant", "Assistant", model)
                .with_job("Generalist", "answers questions and uses tools")
                .with_instruction("You are a helpful, concise assistant.")
                .with_tools(["calculator", "get_weather", "shell", "get_message_text"])],
            orchestration: OrchestrationConfig::default(),
            streaming: StreamingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: env::var("ROUNDTABLE_API_BASE")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout_secs: 120,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { print_tokens: true }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let url = env::var("ROUNDTABLE_STORE_URL").ok().filter(|u| !u.is_empty());
        Self {
            enabled: true,
            url,
            api_key: env::var("ROUNDTABLE_STORE_KEY").ok(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roundtable")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if !Self::config_file().exists() {
            debug!("no config file, using defaults");
            return Self::default();
        }

        match Self::load_from_file() {
            Ok(mut config) => {
                config.apply_env_with(|name| env::var(name).ok());
                config
            }
            Err(e) => {
                warn!(
                    path = %Self::config_file().display(),
                    error = %e,
                    "ignoring config file, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Apply `ROUNDTABLE_*` and `GEMINI_API_KEY` overrides on top of a
    /// loaded file. Empty values are ignored.
    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = var("ROUNDTABLE_API_BASE") {
            self.api.base_url = base_url;
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(model) = var("ROUNDTABLE_MODEL") {
            self.manager.model = model;
        }
        if let Some(strategy) = var("ROUNDTABLE_STRATEGY") {
            match strategy.parse() {
                Ok(strategy) => self.orchestration.strategy = strategy,
                Err(e) => warn!(error = %e, "ignoring ROUNDTABLE_STRATEGY"),
            }
        }
        if let Some(url) = var("ROUNDTABLE_STORE_URL") {
            self.store.url = Some(url);
        }
        if let Some(key) = var("ROUNDTABLE_STORE_KEY") {
            self.store.api_key = Some(key);
        }
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(RoundtableError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| RoundtableError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| RoundtableError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check roster invariants
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.id.is_empty() || agent.id == "user" || agent.id == "system" {
                return Err(RoundtableError::config(format!(
                    "Invalid agent id '{}'",
                    agent.id
                )));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(RoundtableError::config(format!(
                    "Duplicate agent id '{}'",
                    agent.id
                )));
            }
        }
        Ok(())
    }

    /// Save configuration and return the path
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                RoundtableError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RoundtableError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| RoundtableError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Resolve the credential for a call: specific key first, then the default
    pub fn credential_for(&self, specific: Option<&str>) -> Option<String> {
        specific
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.api.api_key.clone())
    }

    /// Find an agent by id
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
