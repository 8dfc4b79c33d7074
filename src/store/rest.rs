//! PostgREST-style store backend
//!
//! Each table lives at `{base}/rest/v1/{table}`. Filters use the
//! `column=op.value` query syntax, totals come from the `Content-Range`
//! header when `Prefer: count=exact` is sent.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::core::{Result, RoundtableError};
use crate::store::{
    check_column, ConversationRecord, ConversationStore, Page, PageRequest, PromptRecord, Range,
    Record, Table,
};

/// One remote table
pub struct RestTable<R> {
    client: Client,
    endpoint: Url,
    _row: PhantomData<fn() -> R>,
}

impl<R: Record> RestTable<R> {
    fn new(client: Client, base: &Url) -> Result<Self> {
        let endpoint = base
            .join(&format!("rest/v1/{}", R::TABLE))
            .map_err(|e| RoundtableError::store(format!("Invalid store URL: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            _row: PhantomData,
        })
    }

    /// Endpoint URL with filters and an optional page window
    fn url(&self, filters: &[(String, String)], page: Option<PageRequest>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (key, value) in filters {
                query.append_pair(key, value);
            }
            if let Some(page) = page {
                query.append_pair("order", "created_at.desc");
                query.append_pair("limit", &page.limit.to_string());
                query.append_pair("offset", &page.offset.to_string());
            }
        }
        url
    }

    fn id_filter(id: &str) -> Vec<(String, String)> {
        vec![("id".to_string(), format!("eq.{}", id))]
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Prefer", "return=representation")
    }

    async fn rows(response: Response) -> Result<Vec<R>> {
        let response = check_status(response).await?;
        Ok(response.json::<Vec<R>>().await?)
    }

    async fn first_row(response: Response, action: &str) -> Result<R> {
        Self::rows(response).await?.into_iter().next().ok_or_else(|| {
            RoundtableError::store(format!("{} on '{}' returned no row", action, R::TABLE))
        })
    }

    async fn page(&self, filters: Vec<(String, String)>, page: PageRequest) -> Result<Page<R>> {
        let url = self.url(&filters, Some(page));
        debug!(table = R::TABLE, %url, "listing rows");
        let response = self
            .client
            .get(url)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check_status(response).await?;

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let items: Vec<R> = response.json().await?;
        let total = total.unwrap_or(page.offset + items.len());
        Ok(Page::new(items, total, page))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RoundtableError::store(format!("Store error ({}): {}", status, body)))
}

/// Total from a `Content-Range` value such as `0-9/42` or `*/0`
pub fn parse_content_range(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl<R: Record> Table<R> for RestTable<R> {
    async fn create(&self, record: R) -> Result<R> {
        let response = self
            .request(Method::POST, self.endpoint.clone())
            .json(&record)
            .send()
            .await?;
        Self::first_row(response, "insert").await
    }

    async fn get(&self, id: &str) -> Result<Option<R>> {
        let response = self.client.get(self.url(&Self::id_filter(id), None)).send().await?;
        Ok(Self::rows(response).await?.into_iter().next())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<R>> {
        self.page(Vec::new(), page).await
    }

    async fn update(&self, mut record: R) -> Result<R> {
        record.touch();
        let url = self.url(&Self::id_filter(record.id()), None);
        let response = self.request(Method::PATCH, url).json(&record).send().await?;
        Self::first_row(response, "update").await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let url = self.url(&Self::id_filter(id), None);
        let response = self.request(Method::DELETE, url).send().await?;
        Ok(!Self::rows(response).await?.is_empty())
    }

    async fn search(&self, column: &str, needle: &str, page: PageRequest) -> Result<Page<R>> {
        check_column(R::TEXT_COLUMNS, column, R::TABLE)?;
        let filters = vec![(column.to_string(), contains_filter(needle))];
        self.page(filters, page).await
    }

    async fn filter_range(
        &self,
        column: &str,
        range: Range,
        page: PageRequest,
    ) -> Result<Page<R>> {
        check_column(R::NUMERIC_COLUMNS, column, R::TABLE)?;
        let mut filters = Vec::new();
        if let Some(min) = range.min {
            filters.push((column.to_string(), format!("gte.{}", min)));
        }
        if let Some(max) = range.max {
            filters.push((column.to_string(), format!("lte.{}", max)));
        }
        self.page(filters, page).await
    }
}

/// Case-insensitive substring filter. `ilike` turns every `*` into a
/// wildcard, so the needle goes through `imatch` with punctuation escaped
/// instead; `*`, `,` and parentheses then match themselves.
fn contains_filter(needle: &str) -> String {
    let mut filter = String::from("imatch.");
    for c in needle.chars() {
        if !c.is_alphanumeric() && !c.is_whitespace() {
            filter.push('\\');
        }
        filter.push(c);
    }
    filter
}

/// Store backed by a hosted PostgREST endpoint
pub struct RestStore {
    base: Url,
    conversations: RestTable<ConversationRecord>,
    prompts: RestTable<PromptRecord>,
}

impl RestStore {
    /// Create a store for `base_url`, authenticating with `api_key` when given
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RoundtableError::config(format!("Invalid store URL '{}': {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let invalid = |e: reqwest::header::InvalidHeaderValue| {
                RoundtableError::config(format!("Invalid store key: {}", e))
            };
            headers.insert("apikey", HeaderValue::from_str(&key).map_err(invalid)?);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            conversations: RestTable::new(client.clone(), &base)?,
            prompts: RestTable::new(client, &base)?,
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

impl ConversationStore for RestStore {
    fn conversations(&self) -> &dyn Table<ConversationRecord> {
        &self.conversations
    }

    fn prompts(&self) -> &dyn Table<PromptRecord> {
        &self.prompts
    }

    fn name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
    }

    #[test]
    fn test_table_endpoints() {
        let store = RestStore::new("https://db.example.com", Some("k".into())).unwrap();
        assert_eq!(
            store.conversations.endpoint.as_str(),
            "https://db.example.com/rest/v1/conversations"
        );

        let nested = RestStore::new("https://example.com/project", None).unwrap();
        assert_eq!(
            nested.prompts.endpoint.as_str(),
            "https://example.com/project/rest/v1/prompts"
        );
    }

    #[test]
    fn test_query_composition() {
        let store = RestStore::new("https://db.example.com", None).unwrap();
        let url = store.conversations.url(
            &[("token_count".to_string(), "gte.10".to_string())],
            Some(PageRequest::new(5, 10)),
        );
        let query = url.query().unwrap();
        assert!(query.starts_with("select=*"));
        assert!(query.contains("token_count=gte.10"));
        assert!(query.contains("order=created_at.desc"));
        assert!(query.contains("limit=5"));
        assert!(query.contains("offset=10"));
    }

    #[test]
    fn test_search_needle_is_escaped() {
        assert_eq!(contains_filter("Paris"), "imatch.Paris");
        assert_eq!(contains_filter("a*b"), r"imatch.a\*b");
        assert_eq!(contains_filter("x,y (z)"), r"imatch.x\,y \(z\)");

        let store = RestStore::new("https://db.example.com", None).unwrap();
        let url = store
            .prompts
            .url(&[("user_text".to_string(), contains_filter("a*b"))], None);
        let (_, value) = url
            .query_pairs()
            .find(|(key, _)| key == "user_text")
            .unwrap();
        assert_eq!(value, r"imatch.a\*b");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RestStore::new("not a url", None).is_err());
    }
}
