//! Executes structured queries against a [`SearchIndex`] and normalizes raw
//! hits into typed [`SearchResult`] records.
//!
//! The client is stateless across pages: each call returns one page and
//! echoes the backend's continuation token. Timeouts surface as
//! `SearchTimeout` and are never retried here.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::index::{IndexRequest, SearchIndex};
use crate::models::{SearchPage, SearchQuery, SearchResult, UNKNOWN};

/// Metadata fields lifted from the semi-structured hit payload onto every
/// result. Missing ones carry the `"unknown"` sentinel.
const RESULT_FIELDS: &[&str] = &[
    "project_id",
    "dataset_id",
    "table_id",
    "asset_type",
    "row_count",
    "has_pii",
    "has_phi",
];

pub struct SearchClient {
    index: Arc<dyn SearchIndex>,
    cfg: SearchConfig,
}

impl SearchClient {
    pub fn new(index: Arc<dyn SearchIndex>, cfg: SearchConfig) -> Self {
        Self { index, cfg }
    }

    /// Execute one page of `query`.
    ///
    /// `"*"` and empty text both mean match-all subject to filters. Zero
    /// matches is a valid outcome, not an error. When `timeout` is `None`
    /// the configured default applies.
    pub async fn search(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<SearchPage> {
        // The index treats wildcard and empty identically; normalize here so
        // both paths are literally the same request.
        let text = if query.text.trim() == "*" {
            String::new()
        } else {
            query.text.clone()
        };

        let request = IndexRequest {
            query: text,
            filter: query.filter_expression(),
            page_size: query.page_size,
            page_token: page_token.map(|t| t.to_string()),
            order_by: query.order_by.clone(),
        };

        let timeout = timeout.unwrap_or(Duration::from_secs(self.cfg.timeout_secs));
        let response = self.index.search(&request, timeout).await?;

        tracing::debug!(
            hits = response.results.len(),
            more = response.next_page_token.is_some(),
            "search page"
        );

        let results = response
            .results
            .iter()
            .map(|hit| normalize_hit(hit, self.cfg.excerpt_max_chars))
            .collect();

        Ok(SearchPage {
            results,
            next_page_token: response.next_page_token,
        })
    }
}

/// Normalize one raw index hit into a [`SearchResult`].
///
/// Never fails: a missing identifier is reconstructed from the metadata
/// triple, and missing metadata fields default to the `"unknown"` sentinel.
pub fn normalize_hit(hit: &Value, excerpt_max_chars: usize) -> SearchResult {
    let document = hit.get("document").unwrap_or(hit);
    let data = document.get("structData").cloned().unwrap_or_default();

    let mut fields = std::collections::BTreeMap::new();
    for field in RESULT_FIELDS {
        let value = match data.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => UNKNOWN.to_string(),
        };
        fields.insert((*field).to_string(), value);
    }

    let id = match document.get("id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!(
            "{}.{}.{}",
            fields["project_id"], fields["dataset_id"], fields["table_id"]
        ),
    };

    let excerpt = document
        .get("derivedStructData")
        .and_then(|d| d.get("snippets"))
        .and_then(|s| s.as_array())
        .and_then(|s| s.first())
        .and_then(|s| s.get("snippet"))
        .and_then(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| truncate_excerpt(s, excerpt_max_chars));

    SearchResult {
        id,
        fields,
        excerpt,
    }
}

/// Truncate to a character bound, appending an ellipsis when cut.
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::models::{FilterClause, FilterValue};

    fn client_with(docs: Vec<Value>) -> SearchClient {
        SearchClient::new(
            Arc::new(MemoryIndex::with_documents(docs)),
            SearchConfig::default(),
        )
    }

    fn sample_doc() -> Value {
        serde_json::json!({
            "id": "acme.core.orders",
            "structData": {
                "project_id": "acme",
                "dataset_id": "core",
                "table_id": "orders",
                "asset_type": "TABLE",
                "row_count": 120000,
                "has_pii": false,
            },
            "content": "order line items and totals",
        })
    }

    #[test]
    fn test_normalize_missing_fields_use_sentinel() {
        let hit = serde_json::json!({
            "document": {
                "id": "p.d.t",
                "structData": { "project_id": "p" }
            }
        });
        let result = normalize_hit(&hit, 400);
        assert_eq!(result.id, "p.d.t");
        assert_eq!(result.fields["project_id"], "p");
        assert_eq!(result.fields["dataset_id"], UNKNOWN);
        assert_eq!(result.fields["has_phi"], UNKNOWN);
        assert!(result.excerpt.is_none());
    }

    #[test]
    fn test_normalize_reconstructs_missing_id() {
        let hit = serde_json::json!({
            "document": {
                "structData": {
                    "project_id": "p",
                    "dataset_id": "d",
                    "table_id": "t",
                }
            }
        });
        let result = normalize_hit(&hit, 400);
        assert_eq!(result.id, "p.d.t");
    }

    #[test]
    fn test_normalize_numeric_and_bool_fields_stringified() {
        let result = normalize_hit(
            &serde_json::json!({ "document": {
                "id": "x",
                "structData": { "row_count": 42, "has_pii": true }
            }}),
            400,
        );
        assert_eq!(result.fields["row_count"], "42");
        assert_eq!(result.fields["has_pii"], "true");
    }

    #[test]
    fn test_excerpt_truncated_with_ellipsis() {
        let long = "x".repeat(500);
        let hit = serde_json::json!({
            "document": {
                "id": "a.b.c",
                "structData": {},
                "derivedStructData": { "snippets": [ { "snippet": long } ] }
            }
        });
        let result = normalize_hit(&hit, 400);
        let excerpt = result.excerpt.unwrap();
        assert_eq!(excerpt.chars().count(), 403);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let text = "é".repeat(10);
        assert_eq!(truncate_excerpt(&text, 4), "éééé...");
        assert_eq!(truncate_excerpt(&text, 10), text);
    }

    #[tokio::test]
    async fn test_wildcard_equals_empty() {
        let client = client_with(vec![sample_doc()]);
        for text in ["*", ""] {
            let page = client
                .search(
                    &SearchQuery {
                        text: text.to_string(),
                        filters: vec![],
                        page_size: 10,
                        order_by: None,
                    },
                    None,
                    None,
                )
                .await
                .unwrap();
            assert_eq!(page.results.len(), 1, "query {text:?}");
        }
    }

    #[tokio::test]
    async fn test_combined_text_and_filter_query() {
        let mut other = sample_doc();
        other["id"] = "other.core.orders".into();
        other["structData"]["project_id"] = "other".into();
        let client = client_with(vec![sample_doc(), other]);

        let page = client
            .search(
                &SearchQuery {
                    text: "order totals".to_string(),
                    filters: vec![
                        FilterClause::new("project_id", FilterValue::Str("acme".into())).unwrap(),
                    ],
                    page_size: 10,
                    order_by: None,
                },
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, "acme.core.orders");
    }

    #[tokio::test]
    async fn test_empty_page_is_ok() {
        let client = client_with(vec![]);
        let page = client
            .search(
                &SearchQuery {
                    text: "*".to_string(),
                    filters: vec![],
                    page_size: 10,
                    order_by: None,
                },
                None,
                None,
            )
            .await
            .unwrap();
        assert!(page.results.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
