//! In-process store backend

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::{Result, RoundtableError};
use crate::store::{
    check_column, ConversationRecord, ConversationStore, Page, PageRequest, PromptRecord, Range,
    Record, Table,
};

/// One table held in memory
pub struct MemoryTable<R> {
    rows: RwLock<Vec<R>>,
}

impl<R: Record> Default for MemoryTable<R> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl<R: Record> MemoryTable<R> {
    /// Matching rows, newest first, cut to the requested page
    fn page_where(&self, request: PageRequest, keep: impl Fn(&R) -> bool) -> Page<R> {
        let mut matching: Vec<R> = self.rows.read().iter().rev().filter(|r| keep(r)).cloned().collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.created_at()));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        Page::new(items, total, request)
    }
}

fn column_value<R: Record>(record: &R, column: &str) -> Value {
    serde_json::to_value(record)
        .ok()
        .and_then(|mut v| v.get_mut(column).map(Value::take))
        .unwrap_or(Value::Null)
}

#[async_trait]
impl<R: Record> Table<R> for MemoryTable<R> {
    async fn create(&self, record: R) -> Result<R> {
        let mut rows = self.rows.write();
        if rows.iter().any(|r| r.id() == record.id()) {
            return Err(RoundtableError::store(format!(
                "{} row '{}' already exists",
                R::TABLE,
                record.id()
            )));
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<R>> {
        Ok(self.rows.read().iter().find(|r| r.id() == id).cloned())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<R>> {
        Ok(self.page_where(page, |_| true))
    }

    async fn update(&self, mut record: R) -> Result<R> {
        let mut rows = self.rows.write();
        let slot = rows
            .iter_mut()
            .find(|r| r.id() == record.id())
            .ok_or_else(|| {
                RoundtableError::store(format!("{} row '{}' not found", R::TABLE, record.id()))
            })?;
        record.touch();
        *slot = record.clone();
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        Ok(rows.len() < before)
    }

    async fn search(&self, column: &str, needle: &str, page: PageRequest) -> Result<Page<R>> {
        check_column(R::TEXT_COLUMNS, column, R::TABLE)?;
        let needle = needle.to_lowercase();
        Ok(self.page_where(page, |r| {
            column_value(r, column)
                .as_str()
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        }))
    }

    async fn filter_range(
        &self,
        column: &str,
        range: Range,
        page: PageRequest,
    ) -> Result<Page<R>> {
        check_column(R::NUMERIC_COLUMNS, column, R::TABLE)?;
        Ok(self.page_where(page, |r| {
            column_value(r, column)
                .as_i64()
                .is_some_and(|value| range.contains(value))
        }))
    }
}

/// Store that lives as long as the process
#[derive(Default)]
pub struct MemoryStore {
    conversations: MemoryTable<ConversationRecord>,
    prompts: MemoryTable<PromptRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryStore {
    fn conversations(&self) -> &dyn Table<ConversationRecord> {
        &self.conversations
    }

    fn prompts(&self) -> &dyn Table<PromptRecord> {
        &self.prompts
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn conversation(id: &str, title: &str, tokens: i64, age_secs: i64) -> ConversationRecord {
        let mut record = ConversationRecord::new(id, title);
        record.token_count = tokens;
        record.created_at = Utc::now() - Duration::seconds(age_secs);
        record
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let table = store.conversations();
        table.create(conversation("a", "Rust lifetimes", 120, 30)).await.unwrap();
        table.create(conversation("b", "Weather in Tokyo", 40, 20)).await.unwrap();
        table.create(conversation("c", "More rust", 900, 10)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let store = seeded().await;
        let table = store.conversations();

        let mut record = table.get("b").await.unwrap().unwrap();
        record.title = "Weather".into();
        let updated = table.update(record).await.unwrap();
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(table.get("b").await.unwrap().unwrap().title, "Weather");

        assert!(table.delete("b").await.unwrap());
        assert!(!table.delete("b").await.unwrap());
        assert!(table.get("b").await.unwrap().is_none());

        assert!(table.update(ConversationRecord::new("zzz", "x")).await.is_err());
        assert!(table.create(conversation("a", "dup", 0, 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_pagination_newest_first() {
        let store = seeded().await;
        let first = store.conversations().list(PageRequest::new(2, 0)).await.unwrap();
        let ids: Vec<&str> = first.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(first.total, 3);
        assert!(first.has_more);

        let second = store.conversations().list(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_search_and_range() {
        let store = seeded().await;
        let table = store.conversations();

        let found = table.search("title", "RUST", PageRequest::default()).await.unwrap();
        assert_eq!(found.total, 2);

        let range = Range {
            min: Some(100),
            max: Some(500),
        };
        let found = table.filter_range("token_count", range, PageRequest::default()).await.unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].id, "a");

        assert!(table.search("token_count", "1", PageRequest::default()).await.is_err());
        assert!(table
            .filter_range("title", Range::default(), PageRequest::default())
            .await
            .is_err());
    }
}
