//! Persistence
//!
//! Two logical tables, conversations and prompts, behind one async table
//! interface. `MemoryStore` keeps rows in process; `RestStore` talks to a
//! PostgREST-style hosted database.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::StoreConfig;
use crate::core::{Result, RoundtableError};

pub use memory::MemoryStore;
pub use rest::RestStore;

/// A row type stored in one table
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name
    const TABLE: &'static str;
    /// Columns that support substring search
    const TEXT_COLUMNS: &'static [&'static str];
    /// Columns that support range filters
    const NUMERIC_COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Stamp the update time
    fn touch(&mut self);
}

/// Limit/offset window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub items: Vec<R>,
    /// Rows matching the query across all pages
    pub total: usize,
    pub has_more: bool,
}

impl<R> Page<R> {
    pub fn new(items: Vec<R>, total: usize, request: PageRequest) -> Self {
        let has_more = request.offset + items.len() < total;
        Self {
            items,
            total,
            has_more,
        }
    }
}

/// Inclusive range filter on a numeric column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Range {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Range {
    pub fn contains(&self, value: i64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// CRUD operations on one table. Lists are newest first.
#[async_trait]
pub trait Table<R: Record>: Send + Sync {
    async fn create(&self, record: R) -> Result<R>;

    async fn get(&self, id: &str) -> Result<Option<R>>;

    async fn list(&self, page: PageRequest) -> Result<Page<R>>;

    /// Replace an existing row; missing ids are an error
    async fn update(&self, record: R) -> Result<R>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Case-insensitive substring match on a text column
    async fn search(&self, column: &str, needle: &str, page: PageRequest) -> Result<Page<R>>;

    /// Inclusive range filter on a numeric column
    async fn filter_range(&self, column: &str, range: Range, page: PageRequest)
        -> Result<Page<R>>;
}

/// A backend holding both tables
pub trait ConversationStore: Send + Sync {
    fn conversations(&self) -> &dyn Table<ConversationRecord>;

    fn prompts(&self) -> &dyn Table<PromptRecord>;

    fn name(&self) -> &str;
}

/// Build the configured backend; `None` when persistence is off
pub fn from_config(config: &StoreConfig) -> Result<Option<Box<dyn ConversationStore>>> {
    if !config.enabled {
        return Ok(None);
    }
    match config.url.as_deref() {
        Some(url) => Ok(Some(Box::new(RestStore::new(url, config.api_key.clone())?))),
        None => Ok(Some(Box::new(MemoryStore::new()))),
    }
}

pub(crate) fn check_column(allowed: &[&str], column: &str, table: &str) -> Result<()> {
    if allowed.contains(&column) {
        Ok(())
    } else {
        Err(RoundtableError::store(format!(
            "column '{}' cannot be queried this way on '{}'",
            column, table
        )))
    }
}

/// Conversation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    pub token_count: i64,
    /// Set when the conversation history was cleared
    #[serde(default)]
    pub clear: bool,
    #[serde(default)]
    pub system_instruction: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            token_count: 0,
            clear: false,
            system_instruction: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for ConversationRecord {
    const TABLE: &'static str = "conversations";
    const TEXT_COLUMNS: &'static [&'static str] = &["title", "system_instruction"];
    const NUMERIC_COLUMNS: &'static [&'static str] = &["token_count"];

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One user prompt and the reply it got
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: String,
    pub user_text: String,
    #[serde(default)]
    pub ai_response: String,
    pub model: String,
    #[serde(default)]
    pub responded: bool,
    #[serde(default)]
    pub grounding: bool,
    #[serde(default)]
    pub url_context: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptRecord {
    pub fn new(user_text: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_text: user_text.into(),
            ai_response: String::new(),
            model: model.into(),
            responded: false,
            grounding: false,
            url_context: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the reply
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.ai_response = response.into();
        self.responded = true;
        self
    }
}

impl Record for PromptRecord {
    const TABLE: &'static str = "prompts";
    const TEXT_COLUMNS: &'static [&'static str] = &["user_text", "ai_response", "model"];
    const NUMERIC_COLUMNS: &'static [&'static str] = &[];

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
