//! Semantic index backends.
//!
//! Defines the [`SearchIndex`] trait and two implementations:
//! - **[`DiscoveryIndex`]** — calls the managed search service's REST
//!   `:search` endpoint, addressed by the fully-qualified serving
//!   configuration path.
//! - **[`MemoryIndex`]** — in-process index that evaluates the same filter
//!   grammar over a fixed document set. Used by tests and local demos.
//!
//! Backends return raw hits; normalization into typed results lives in
//! [`crate::search_client`]. No backend retries internally — retry policy
//! belongs to the caller so interactive latency stays predictable.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};

/// Backend-agnostic search request, already rendered to the index's terms.
#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    pub query: String,
    pub filter: Option<String>,
    pub page_size: u32,
    pub page_token: Option<String>,
    pub order_by: Option<String>,
}

/// One page of raw hits plus the backend's continuation token.
#[derive(Debug, Clone, Default)]
pub struct IndexResponse {
    /// Raw hit objects, each carrying a `document` with `id`, `structData`,
    /// and optionally `derivedStructData`.
    pub results: Vec<Value>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Execute one page of a search. The deadline is supplied by the caller
    /// and a miss must surface as [`Error::SearchTimeout`].
    async fn search(&self, request: &IndexRequest, timeout: Duration) -> Result<IndexResponse>;
}

// ============ Remote index ============

/// Client for the managed search service.
///
/// Requires the `DISCOVERY_API_TOKEN` environment variable for bearer auth.
/// The HTTP client is injected at construction and shared process-wide.
pub struct DiscoveryIndex {
    client: reqwest::Client,
    base_url: String,
    serving_config: String,
}

impl DiscoveryIndex {
    pub fn new(client: reqwest::Client, catalog: &CatalogConfig) -> Self {
        Self {
            client,
            base_url: "https://discoveryengine.googleapis.com".to_string(),
            serving_config: catalog.serving_config(),
        }
    }

    /// Override the endpoint base URL (tests, private service connect).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchIndex for DiscoveryIndex {
    async fn search(&self, request: &IndexRequest, timeout: Duration) -> Result<IndexResponse> {
        let auth_token = std::env::var("DISCOVERY_API_TOKEN")
            .map_err(|_| Error::UpstreamUnavailable("DISCOVERY_API_TOKEN not set".to_string()))?;

        let url = format!("{}/v1/{}:search", self.base_url, self.serving_config);

        let mut body = serde_json::json!({
            "query": request.query,
            "pageSize": request.page_size,
        });
        if let Some(ref filter) = request.filter {
            body["filter"] = Value::String(filter.clone());
        }
        if let Some(ref token) = request.page_token {
            body["pageToken"] = Value::String(token.clone());
        }
        if let Some(ref order_by) = request.order_by {
            body["orderBy"] = Value::String(order_by.clone());
        }

        tracing::debug!(
            serving_config = %self.serving_config,
            page_size = request.page_size,
            has_filter = request.filter.is_some(),
            "index search request"
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(auth_token)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::SearchTimeout(format!("index did not respond within {timeout:?}"))
                } else {
                    Error::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 400 {
                return Err(Error::InvalidArgument(format!(
                    "index rejected request: {text}"
                )));
            }
            return Err(Error::UpstreamUnavailable(format!(
                "index returned {status}: {text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("index response was not JSON: {e}")))?;

        let results = json
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        let next_page_token = json
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string());

        Ok(IndexResponse {
            results,
            next_page_token,
        })
    }
}

// ============ Filter expression evaluation ============

/// Parse a rendered filter expression back into `(field, value)` pairs.
///
/// Accepts the exact grammar the query builder emits: quoted literals joined
/// with `AND`. Used by [`MemoryIndex`] so the in-process backend honors the
/// same contract as the managed one.
pub fn parse_filter_expression(expr: &str) -> Result<Vec<(String, String)>> {
    let mut clauses = Vec::new();
    let mut rest = expr;
    loop {
        let (field, after_eq) = rest.split_once('=').ok_or_else(|| {
            Error::InvalidArgument(format!("malformed filter clause '{rest}'"))
        })?;
        let field = field.trim();
        let literal = after_eq.trim_start();

        // Scan the quoted literal; `AND` and `=` inside quotes are data.
        let mut inner = literal.strip_prefix('"').ok_or_else(|| {
            Error::InvalidArgument(format!("filter value must be quoted for '{field}'"))
        })?;
        let mut value = String::new();
        let mut closed = false;
        while let Some(c) = inner.chars().next() {
            inner = &inner[c.len_utf8()..];
            match c {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' if inner.starts_with('"') => {
                    value.push('"');
                    inner = &inner[1..];
                }
                _ => value.push(c),
            }
        }
        if !closed {
            return Err(Error::InvalidArgument(format!(
                "unterminated filter value for '{field}'"
            )));
        }
        clauses.push((field.to_string(), value));

        let tail = inner.trim_start();
        if tail.is_empty() {
            break;
        }
        rest = tail.strip_prefix("AND").ok_or_else(|| {
            Error::InvalidArgument(format!("malformed filter expression near '{tail}'"))
        })?;
    }
    Ok(clauses)
}

// ============ In-memory index ============

/// In-process [`SearchIndex`] over a fixed set of documents.
///
/// Documents are JSON objects with `id`, `structData`, and optional
/// `content` keys. Relevance is term overlap against `content` and the
/// struct data; continuation tokens are numeric offsets.
#[derive(Default)]
pub struct MemoryIndex {
    docs: Vec<Value>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: Vec<Value>) -> Self {
        Self { docs }
    }

    pub fn push(&mut self, doc: Value) {
        self.docs.push(doc);
    }

    fn matches_filter(doc: &Value, clauses: &[(String, String)]) -> bool {
        let data = doc.get("structData").cloned().unwrap_or_default();
        clauses.iter().all(|(field, expected)| {
            match data.get(field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                _ => false,
            }
        })
    }

    fn relevance(doc: &Value, terms: &[String]) -> usize {
        if terms.is_empty() {
            return 0;
        }
        let mut haystack = doc
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_lowercase();
        if let Some(data) = doc.get("structData") {
            haystack.push(' ');
            haystack.push_str(&data.to_string().to_lowercase());
        }
        terms.iter().filter(|t| haystack.contains(t.as_str())).count()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn search(&self, request: &IndexRequest, _timeout: Duration) -> Result<IndexResponse> {
        let clauses = match request.filter {
            Some(ref expr) => parse_filter_expression(expr)?,
            None => Vec::new(),
        };

        // "*" and "" both mean match-all subject to filters.
        let text = request.query.trim();
        let terms: Vec<String> = if text.is_empty() || text == "*" {
            Vec::new()
        } else {
            text.split_whitespace().map(|t| t.to_lowercase()).collect()
        };

        // Terms gate matching only for unfiltered queries. With a structured
        // filter present they just rank: the residual text after hint
        // extraction is often filler and must not empty a filtered page.
        let text_gated = clauses.is_empty() && !terms.is_empty();
        let mut scored: Vec<(usize, &Value)> = self
            .docs
            .iter()
            .filter(|d| Self::matches_filter(d, &clauses))
            .map(|d| (Self::relevance(d, &terms), d))
            .filter(|(score, _)| !text_gated || *score > 0)
            .collect();
        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let offset: usize = match request.page_token {
            Some(ref t) => t.parse().map_err(|_| {
                Error::InvalidArgument(format!("malformed page token '{t}'"))
            })?,
            None => 0,
        };

        let page_size = request.page_size as usize;
        let page: Vec<Value> = scored
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|(_, d)| {
                let content = d.get("content").and_then(|c| c.as_str()).unwrap_or_default();
                serde_json::json!({
                    "document": {
                        "id": d.get("id").cloned().unwrap_or_default(),
                        "structData": d.get("structData").cloned().unwrap_or_default(),
                        "derivedStructData": {
                            "snippets": [ { "snippet": content } ]
                        }
                    }
                })
            })
            .collect();

        let next_page_token = if offset + page.len() < scored.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(IndexResponse {
            results: page,
            next_page_token,
        })
    }
}
