//! Query construction: free text plus optional structured constraints in,
//! a well-formed [`SearchQuery`] out.
//!
//! The builder scans the user's text for embedded filter hints
//! (`project:<id>`, `dataset:<id>`, PII phrasing). Each recognized hint is
//! removed from the semantic text, so it does not double-count in relevance
//! scoring, and converted into a structured filter clause. Unrecognized text
//! is never an error — it simply stays in the semantic portion.
//!
//! Hint rules are an ordered list of (pattern, clause) extractors applied
//! deterministically, so overlapping hints in one string (a project and a
//! PII mention, say) extract without interference.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::models::{FilterClause, FilterValue, SearchQuery, FILTERABLE_FIELDS};

struct HintRule {
    field: &'static str,
    pattern: Regex,
    /// Builds the clause value from the rule's capture group, if any.
    value: fn(Option<&str>) -> FilterValue,
}

fn hint_rules() -> &'static [HintRule] {
    static RULES: OnceLock<Vec<HintRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            HintRule {
                field: "project_id",
                pattern: Regex::new(r"(?i)\bproject:\s*([A-Za-z0-9][A-Za-z0-9_.-]*)").unwrap(),
                value: |cap| FilterValue::Str(cap.unwrap_or_default().to_string()),
            },
            HintRule {
                field: "dataset_id",
                pattern: Regex::new(r"(?i)\bdataset:\s*([A-Za-z0-9][A-Za-z0-9_.-]*)").unwrap(),
                value: |cap| FilterValue::Str(cap.unwrap_or_default().to_string()),
            },
            HintRule {
                field: "has_pii",
                pattern: Regex::new(
                    r"(?i)\b(?:p\.?i\.?i\.?|personal data|personally identifiable(?: information)?)\b",
                )
                .unwrap(),
                value: |_| FilterValue::Bool(true),
            },
        ]
    })
}

/// Scan `text` for filter hints. Returns the remaining semantic text (hint
/// spans removed, whitespace collapsed) and the extracted clauses.
///
/// When a hint repeats, the first occurrence wins; every occurrence is still
/// stripped from the text.
pub fn extract_hints(text: &str) -> (String, Vec<(String, FilterValue)>) {
    let mut remaining = text.to_string();
    let mut extracted: Vec<(String, FilterValue)> = Vec::new();

    for rule in hint_rules() {
        let mut first_value: Option<FilterValue> = None;
        remaining = rule
            .pattern
            .replace_all(&remaining, |caps: &regex::Captures<'_>| {
                if first_value.is_none() {
                    let cap = caps.get(1).map(|m| m.as_str());
                    first_value = Some((rule.value)(cap));
                }
                ""
            })
            .into_owned();
        if let Some(value) = first_value {
            extracted.push((rule.field.to_string(), value));
        }
    }

    let cleaned = remaining.split_whitespace().collect::<Vec<_>>().join(" ");
    (cleaned, extracted)
}

/// Build a [`SearchQuery`] from free text plus optional explicit constraints.
///
/// - `user_query` may be empty; an empty query matches broadly.
/// - `explicit_filters` are merged with extracted hints; explicit values win
///   on key collision.
/// - `page_size` defaults from config; non-positive or over-maximum values
///   fail with `InvalidArgument`.
/// - `order_by` is passed through verbatim; field validation is deferred to
///   the index.
pub fn build_query(
    user_query: &str,
    explicit_filters: &[(String, FilterValue)],
    page_size: Option<i64>,
    order_by: Option<&str>,
    cfg: &SearchConfig,
) -> Result<SearchQuery> {
    let (text, hints) = extract_hints(user_query);

    let mut merged: BTreeMap<String, FilterValue> = hints.into_iter().collect();
    for (field, value) in explicit_filters {
        merged.insert(field.clone(), value.clone());
    }

    // Emit clauses in allow-list order so the rendered expression is
    // deterministic regardless of hint order in the input text.
    let mut filters = Vec::with_capacity(merged.len());
    for field in FILTERABLE_FIELDS {
        if let Some(value) = merged.remove(*field) {
            filters.push(FilterClause::new(field, value)?);
        }
    }
    if let Some((field, _)) = merged.into_iter().next() {
        return Err(Error::InvalidArgument(format!(
            "unsupported filter field '{field}'"
        )));
    }

    let page_size = match page_size {
        None => cfg.default_page_size,
        Some(n) if n < 1 => {
            return Err(Error::InvalidArgument(format!(
                "page_size must be a positive integer, got {n}"
            )))
        }
        Some(n) if n > i64::from(cfg.max_page_size) => {
            return Err(Error::InvalidArgument(format!(
                "page_size {n} exceeds maximum {}",
                cfg.max_page_size
            )))
        }
        Some(n) => n as u32,
    };

    Ok(SearchQuery {
        text,
        filters,
        page_size,
        order_by: order_by.map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SearchConfig {
        SearchConfig::default()
    }

    #[test]
    fn test_empty_query_is_valid() {
        let q = build_query("", &[], None, None, &cfg()).unwrap();
        assert_eq!(q.text, "");
        assert!(q.filters.is_empty());
        assert_eq!(q.page_size, 10);
    }

    #[test]
    fn test_page_size_default_and_passthrough() {
        let q = build_query("x", &[], None, None, &cfg()).unwrap();
        assert_eq!(q.page_size, 10);
        for n in [1i64, 5, 50, 100] {
            let q = build_query("x", &[], Some(n), None, &cfg()).unwrap();
            assert_eq!(i64::from(q.page_size), n);
        }
    }

    #[test]
    fn test_page_size_rejects_non_positive() {
        for n in [0i64, -1, -10] {
            let err = build_query("x", &[], Some(n), None, &cfg()).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{n}");
        }
    }

    #[test]
    fn test_page_size_rejects_over_maximum() {
        let err = build_query("x", &[], Some(101), None, &cfg()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_project_hint_extracted() {
        let q = build_query("tables in project:analytics-prod", &[], None, None, &cfg()).unwrap();
        assert_eq!(
            q.filter_expression().unwrap(),
            "project_id = \"analytics-prod\""
        );
        assert_eq!(q.text, "tables in");
    }

    #[test]
    fn test_hint_with_space_after_colon() {
        let q = build_query(
            "find tables in project: my-project with PII",
            &[],
            None,
            None,
            &cfg(),
        )
        .unwrap();
        let expr = q.filter_expression().unwrap();
        assert!(expr.contains("project_id = \"my-project\""), "{expr}");
        assert!(expr.contains("has_pii = \"true\""), "{expr}");
        assert!(!q.text.contains("project: my-project"), "text: {}", q.text);
        assert!(!q.text.contains("PII"), "text: {}", q.text);
    }

    #[test]
    fn test_pii_phrasings() {
        for phrase in [
            "tables with PII",
            "tables with pii",
            "tables holding personal data",
            "personally identifiable information in billing",
        ] {
            let q = build_query(phrase, &[], None, None, &cfg()).unwrap();
            assert_eq!(
                q.filter_expression().unwrap(),
                "has_pii = \"true\"",
                "{phrase}"
            );
        }
    }

    #[test]
    fn test_boolean_hint_quoted_in_expression() {
        let q = build_query("customer tables with PII", &[], None, None, &cfg()).unwrap();
        let expr = q.filter_expression().unwrap();
        assert!(expr.contains("has_pii = \"true\""), "{expr}");
        assert!(!expr.contains("has_pii = true"), "unquoted boolean: {expr}");
    }

    #[test]
    fn test_explicit_filters_win_on_collision() {
        let q = build_query(
            "events in project:wrong-one",
            &[(
                "project_id".to_string(),
                FilterValue::Str("right-one".into()),
            )],
            None,
            None,
            &cfg(),
        )
        .unwrap();
        assert_eq!(
            q.filter_expression().unwrap(),
            "project_id = \"right-one\""
        );
    }

    #[test]
    fn test_multiple_hints_combine_conjunctively() {
        let q = build_query(
            "dataset:billing project:acme revenue tables",
            &[],
            None,
            None,
            &cfg(),
        )
        .unwrap();
        assert_eq!(
            q.filter_expression().unwrap(),
            "project_id = \"acme\" AND dataset_id = \"billing\""
        );
        assert_eq!(q.text, "revenue tables");
    }

    #[test]
    fn test_unrecognized_text_left_alone() {
        let q = build_query("weird ~~tokens~~ stay put", &[], None, None, &cfg()).unwrap();
        assert_eq!(q.text, "weird ~~tokens~~ stay put");
        assert!(q.filters.is_empty());
    }

    #[test]
    fn test_explicit_unknown_field_rejected() {
        let err = build_query(
            "x",
            &[("owner".to_string(), FilterValue::Str("me".into()))],
            None,
            None,
            &cfg(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_order_by_passthrough() {
        let q = build_query("x", &[], None, Some("modified_time desc"), &cfg()).unwrap();
        assert_eq!(q.order_by.as_deref(), Some("modified_time desc"));
    }

    #[test]
    fn test_repeated_hint_first_wins_all_stripped() {
        let q = build_query("project:one and project:two", &[], None, None, &cfg()).unwrap();
        assert_eq!(q.filter_expression().unwrap(), "project_id = \"one\"");
        assert!(!q.text.contains("project:"));
    }
}
