//! Core data types shared by the query builder, search client, and handlers.
//!
//! [`SearchQuery`] and [`SearchResult`] are value objects: built, passed by
//! value, and discarded per invocation. Nothing in this module holds shared
//! mutable state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Metadata fields the index accepts in structured filter clauses.
///
/// Filters on any other field are rejected with `InvalidArgument` before a
/// request is built.
pub const FILTERABLE_FIELDS: &[&str] = &[
    "project_id",
    "dataset_id",
    "table_id",
    "asset_type",
    "has_pii",
    "has_phi",
    "row_count",
    "modified_time",
];

/// A single structured filter value.
///
/// The index filter grammar requires boolean literals to appear as quoted
/// strings (`has_pii = "true"`), so rendering quotes every value; the enum
/// exists to keep the caller's intent typed until that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Str(String),
    Bool(bool),
}

impl FilterValue {
    /// Render as a quoted literal per the target filter grammar.
    pub fn as_literal(&self) -> String {
        match self {
            FilterValue::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            FilterValue::Bool(b) => format!("\"{b}\""),
        }
    }
}

/// One `field = value` clause. Clauses are always AND-combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub field: String,
    pub value: FilterValue,
}

impl FilterClause {
    /// Construct a clause, enforcing the field allow-list.
    pub fn new(field: &str, value: FilterValue) -> Result<Self> {
        if !FILTERABLE_FIELDS.contains(&field) {
            return Err(Error::InvalidArgument(format!(
                "unsupported filter field '{field}'"
            )));
        }
        Ok(Self {
            field: field.to_string(),
            value,
        })
    }
}

/// The structured search request produced by the query builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text portion scored for relevance. May be empty (matches broadly).
    pub text: String,
    pub filters: Vec<FilterClause>,
    pub page_size: u32,
    /// Passed through verbatim to the index (e.g. `"modified_time desc"`).
    pub order_by: Option<String>,
}

impl SearchQuery {
    /// Render the AND-combined filter expression, or `None` when unfiltered.
    pub fn filter_expression(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .filters
            .iter()
            .map(|c| format!("{} = {}", c.field, c.value.as_literal()))
            .collect();
        Some(parts.join(" AND "))
    }
}

/// One matched asset, normalized from a raw index hit.
///
/// Results arrive ordered by relevance score descending; that order is part
/// of the contract and preserved through formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable asset identifier (`project.dataset.table` for tables).
    pub id: String,
    /// Structured metadata fields. Missing fields carry the `"unknown"`
    /// sentinel rather than being absent.
    pub fields: BTreeMap<String, String>,
    /// Free-text excerpt, already truncated to the configured bound.
    pub excerpt: Option<String>,
}

/// Sentinel for metadata fields the index payload did not carry.
pub const UNKNOWN: &str = "unknown";

/// One page of results plus the continuation token echoed by the index.
///
/// Pagination across pages is the caller's responsibility; the core is
/// stateless between pages.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub next_page_token: Option<String>,
}

/// Uniform unit of tool-response output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_filter_values_are_quoted() {
        let clause = FilterClause::new("has_pii", FilterValue::Bool(true)).unwrap();
        let query = SearchQuery {
            text: String::new(),
            filters: vec![clause],
            page_size: 10,
            order_by: None,
        };
        let expr = query.filter_expression().unwrap();
        assert_eq!(expr, "has_pii = \"true\"");
        assert!(!expr.contains("= true"), "unquoted boolean in: {expr}");
    }

    #[test]
    fn test_clauses_and_combined() {
        let query = SearchQuery {
            text: String::new(),
            filters: vec![
                FilterClause::new("project_id", FilterValue::Str("p1".into())).unwrap(),
                FilterClause::new("has_phi", FilterValue::Bool(false)).unwrap(),
            ],
            page_size: 10,
            order_by: None,
        };
        assert_eq!(
            query.filter_expression().unwrap(),
            "project_id = \"p1\" AND has_phi = \"false\""
        );
    }

    #[test]
    fn test_empty_filters_render_none() {
        let query = SearchQuery {
            text: "anything".into(),
            filters: vec![],
            page_size: 10,
            order_by: None,
        };
        assert!(query.filter_expression().is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = FilterClause::new("owner_email", FilterValue::Str("x".into())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_string_values_escape_quotes() {
        let clause = FilterClause::new("table_id", FilterValue::Str("a\"b".into())).unwrap();
        assert_eq!(clause.value.as_literal(), "\"a\\\"b\"");
    }
}
