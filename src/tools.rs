//! Tool dispatch: maps external tool invocations onto the query builder,
//! search client, and catalog, and formats results into a uniform
//! content-block envelope.
//!
//! Arguments arrive as a free-form JSON mapping and are converted into a
//! closed set of per-tool argument records ([`ToolInvocation`]) at the
//! boundary. Missing required keys and unknown tool names fail with
//! `InvalidArgument` naming the tool and the key.
//!
//! Every error path funnels through [`format_error`], so callers scanning
//! for failures have one consistent `"error"` marker regardless of which
//! tool failed.

use serde_json::Value;
use std::sync::Arc;

use crate::catalog::{AssetRecord, MetadataCatalog, ReportKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ContentBlock, FilterValue, SearchResult, UNKNOWN};
use crate::query::build_query;
use crate::search_client::SearchClient;

/// Excerpt cap applied when the caller did not ask for full content.
const SHORT_EXCERPT_CHARS: usize = 200;

// ============ Tool names ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    QueryDataAssets,
    GetAssetDetails,
    ListDatasets,
}

impl ToolName {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "query_data_assets" => Ok(ToolName::QueryDataAssets),
            "get_asset_details" => Ok(ToolName::GetAssetDetails),
            "list_datasets" => Ok(ToolName::ListDatasets),
            other => Err(Error::InvalidArgument(format!("unknown tool '{other}'"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::QueryDataAssets => "query_data_assets",
            ToolName::GetAssetDetails => "get_asset_details",
            ToolName::ListDatasets => "list_datasets",
        }
    }
}

// ============ Typed argument records ============

#[derive(Debug, Clone)]
pub struct QueryAssetsArgs {
    pub query: String,
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub has_pii: Option<bool>,
    pub page_size: Option<i64>,
    pub page_token: Option<String>,
    pub include_full_content: bool,
}

#[derive(Debug, Clone)]
pub struct AssetDetailsArgs {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub include_lineage: bool,
    pub include_usage: bool,
    pub run_timestamp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListDatasetsArgs {
    pub project_id: Option<String>,
    pub include_table_counts: bool,
    pub include_costs: bool,
    pub page_size: Option<i64>,
}

/// Tagged union over the per-tool argument records, produced by boundary
/// validation and consumed by dispatch.
#[derive(Debug, Clone)]
pub enum ToolInvocation {
    QueryAssets(QueryAssetsArgs),
    AssetDetails(AssetDetailsArgs),
    ListDatasets(ListDatasetsArgs),
}

fn require_str(args: &Value, tool: &str, key: &str) -> Result<String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(Error::InvalidArgument(format!(
            "{tool}: argument '{key}' must not be empty"
        ))),
        Some(_) => Err(Error::InvalidArgument(format!(
            "{tool}: argument '{key}' must be a string"
        ))),
        None => Err(Error::missing_arg(tool, key)),
    }
}

fn opt_str(args: &Value, tool: &str, key: &str) -> Result<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidArgument(format!(
            "{tool}: argument '{key}' must be a string"
        ))),
    }
}

fn opt_bool(args: &Value, tool: &str, key: &str) -> Result<Option<bool>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::InvalidArgument(format!(
            "{tool}: argument '{key}' must be a boolean"
        ))),
    }
}

/// Run identifiers are either the `latest` alias or a point in time.
fn validate_run_timestamp(tool: &str, value: &str) -> Result<()> {
    if value == "latest"
        || chrono::DateTime::parse_from_rfc3339(value).is_ok()
        || chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    {
        return Ok(());
    }
    Err(Error::InvalidArgument(format!(
        "{tool}: run_timestamp must be 'latest', a date, or an RFC 3339 timestamp"
    )))
}

/// Strict: a non-integer here is an error, never a silent coercion.
fn opt_int(args: &Value, tool: &str, key: &str) -> Result<Option<i64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| {
            Error::InvalidArgument(format!("{tool}: argument '{key}' must be an integer"))
        }),
        Some(_) => Err(Error::InvalidArgument(format!(
            "{tool}: argument '{key}' must be an integer"
        ))),
    }
}

impl ToolInvocation {
    /// Validate a raw `{name, arguments}` pair into a typed invocation.
    pub fn parse(name: &str, args: &Value) -> Result<Self> {
        let tool = ToolName::parse(name)?;
        let tool_str = tool.as_str();
        match tool {
            ToolName::QueryDataAssets => Ok(ToolInvocation::QueryAssets(QueryAssetsArgs {
                query: match args.get("query") {
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(Error::InvalidArgument(format!(
                            "{tool_str}: argument 'query' must be a string"
                        )))
                    }
                    None => return Err(Error::missing_arg(tool_str, "query")),
                },
                project_id: opt_str(args, tool_str, "project_id")?,
                dataset_id: opt_str(args, tool_str, "dataset_id")?,
                has_pii: opt_bool(args, tool_str, "has_pii")?,
                page_size: opt_int(args, tool_str, "page_size")?,
                page_token: opt_str(args, tool_str, "page_token")?,
                include_full_content: opt_bool(args, tool_str, "include_full_content")?
                    .unwrap_or(false),
            })),
            ToolName::GetAssetDetails => Ok(ToolInvocation::AssetDetails(AssetDetailsArgs {
                project_id: require_str(args, tool_str, "project_id")?,
                dataset_id: require_str(args, tool_str, "dataset_id")?,
                table_id: require_str(args, tool_str, "table_id")?,
                include_lineage: opt_bool(args, tool_str, "include_lineage")?.unwrap_or(false),
                include_usage: opt_bool(args, tool_str, "include_usage")?.unwrap_or(false),
                run_timestamp: {
                    let run = opt_str(args, tool_str, "run_timestamp")?;
                    if let Some(ref run) = run {
                        validate_run_timestamp(tool_str, run)?;
                    }
                    run
                },
            })),
            ToolName::ListDatasets => Ok(ToolInvocation::ListDatasets(ListDatasetsArgs {
                project_id: opt_str(args, tool_str, "project_id")?,
                include_table_counts: opt_bool(args, tool_str, "include_table_counts")?
                    .unwrap_or(false),
                include_costs: opt_bool(args, tool_str, "include_costs")?.unwrap_or(false),
                page_size: opt_int(args, tool_str, "page_size")?,
            })),
        }
    }
}

// ============ Handlers ============

pub struct Handlers {
    config: Arc<Config>,
    search: SearchClient,
    catalog: Arc<dyn MetadataCatalog>,
}

impl Handlers {
    pub fn new(config: Arc<Config>, search: SearchClient, catalog: Arc<dyn MetadataCatalog>) -> Self {
        Self {
            config,
            search,
            catalog,
        }
    }

    /// Dispatch a validated invocation. Errors from here are typed; use
    /// [`handle_call`](Self::handle_call) for the enveloped form.
    pub async fn handle(&self, tool_name: &str, arguments: &Value) -> Result<Vec<ContentBlock>> {
        match ToolInvocation::parse(tool_name, arguments)? {
            ToolInvocation::QueryAssets(args) => self.query_data_assets(args).await,
            ToolInvocation::AssetDetails(args) => self.get_asset_details(args).await,
            ToolInvocation::ListDatasets(args) => self.list_datasets(args).await,
        }
    }

    /// Like [`handle`](Self::handle), but failures become an error content
    /// block instead of propagating. This is the external-facing contract.
    pub async fn handle_call(&self, tool_name: &str, arguments: &Value) -> Vec<ContentBlock> {
        match self.handle(tool_name, arguments).await {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "tool call failed");
                vec![format_error(&e)]
            }
        }
    }

    async fn query_data_assets(&self, args: QueryAssetsArgs) -> Result<Vec<ContentBlock>> {
        let mut explicit: Vec<(String, FilterValue)> = Vec::new();
        if let Some(project_id) = args.project_id {
            explicit.push(("project_id".to_string(), FilterValue::Str(project_id)));
        }
        if let Some(dataset_id) = args.dataset_id {
            explicit.push(("dataset_id".to_string(), FilterValue::Str(dataset_id)));
        }
        if let Some(has_pii) = args.has_pii {
            explicit.push(("has_pii".to_string(), FilterValue::Bool(has_pii)));
        }

        let query = build_query(
            &args.query,
            &explicit,
            args.page_size,
            None,
            &self.config.search,
        )?;

        let page = self
            .search
            .search(&query, args.page_token.as_deref(), None)
            .await?;

        if page.results.is_empty() {
            return Ok(vec![ContentBlock::text("No matching data assets found.")]);
        }

        let mut blocks: Vec<ContentBlock> = page
            .results
            .iter()
            .map(|r| format_result(r, args.include_full_content))
            .collect();
        if let Some(token) = page.next_page_token {
            blocks.push(ContentBlock::text(format!("next_page_token: {token}")));
        }
        Ok(blocks)
    }

    async fn get_asset_details(&self, args: AssetDetailsArgs) -> Result<Vec<ContentBlock>> {
        let asset = self
            .catalog
            .get_asset(&args.project_id, &args.dataset_id, &args.table_id)
            .await?;

        let asset_id = format!(
            "{}.{}.{}",
            args.project_id, args.dataset_id, args.table_id
        );
        let asset = match asset {
            Some(a) => a,
            None => {
                return Ok(vec![ContentBlock::text(format!(
                    "asset {asset_id} not found"
                ))])
            }
        };

        let mut blocks = vec![format_asset(&asset)];

        if args.include_lineage {
            blocks.push(
                self.enrichment_block(&args, ReportKind::Lineage, "lineage")
                    .await,
            );
        }
        if args.include_usage {
            blocks.push(self.enrichment_block(&args, ReportKind::Usage, "usage").await);
        }

        Ok(blocks)
    }

    /// Fetch one enrichment document, degrading to a "not found" block.
    /// A missing or unreachable report never fails the composite response.
    async fn enrichment_block(
        &self,
        args: &AssetDetailsArgs,
        kind: ReportKind,
        label: &str,
    ) -> ContentBlock {
        let report = self
            .catalog
            .get_report(
                &args.project_id,
                &args.dataset_id,
                &args.table_id,
                kind,
                args.run_timestamp.as_deref(),
            )
            .await;
        match report {
            Ok(Some(body)) => ContentBlock::text(format!("{label}:\n{body}")),
            Ok(None) => ContentBlock::text(format!("{label} report not found")),
            Err(e) => {
                tracing::warn!(label, error = %e, "enrichment fetch failed");
                ContentBlock::text(format!("{label} report not found"))
            }
        }
    }

    async fn list_datasets(&self, args: ListDatasetsArgs) -> Result<Vec<ContentBlock>> {
        if let Some(n) = args.page_size {
            if n < 1 {
                return Err(Error::InvalidArgument(format!(
                    "list_datasets: page_size must be a positive integer, got {n}"
                )));
            }
            if n > i64::from(self.config.search.max_page_size) {
                return Err(Error::InvalidArgument(format!(
                    "list_datasets: page_size {n} exceeds maximum {}",
                    self.config.search.max_page_size
                )));
            }
        }

        let project_id = args
            .project_id
            .unwrap_or_else(|| self.config.catalog.project_id.clone());

        let mut datasets = self
            .catalog
            .list_datasets(&project_id, args.include_table_counts, args.include_costs)
            .await?;

        if let Some(n) = args.page_size {
            datasets.truncate(n as usize);
        }

        if datasets.is_empty() {
            return Ok(vec![ContentBlock::text(format!(
                "no datasets found in project {project_id}"
            ))]);
        }

        Ok(datasets
            .iter()
            .map(|d| {
                let mut text = format!("dataset_id: {}", d.dataset_id);
                if args.include_table_counts {
                    let count = d
                        .table_count
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| UNKNOWN.to_string());
                    text.push_str(&format!("\ntable_count: {count}"));
                }
                if args.include_costs {
                    let cost = d
                        .monthly_cost_usd
                        .map(|c| format!("{c:.2}"))
                        .unwrap_or_else(|| UNKNOWN.to_string());
                    text.push_str(&format!("\nmonthly_cost_usd: {cost}"));
                }
                ContentBlock::text(text)
            })
            .collect())
    }
}

// ============ Formatting ============

/// Render one search result as a content block of `key: value` lines.
/// [`parse_result_block`] is the inverse.
pub fn format_result(result: &SearchResult, include_full_content: bool) -> ContentBlock {
    let mut text = format!("id: {}", result.id);
    for (field, value) in &result.fields {
        // Values stay single-line so the block parses back line by line.
        text.push_str(&format!("\n{field}: {}", value.replace('\n', " ")));
    }
    if let Some(ref excerpt) = result.excerpt {
        let excerpt = if include_full_content {
            excerpt.clone()
        } else {
            crate::search_client::truncate_excerpt(excerpt, SHORT_EXCERPT_CHARS)
        };
        text.push_str(&format!("\nexcerpt: {}", excerpt.replace('\n', " ")));
    }
    ContentBlock::text(text)
}

/// Recover the identifier and metadata fields from a formatted result block.
pub fn parse_result_block(text: &str) -> Option<SearchResult> {
    let mut id = None;
    let mut fields = std::collections::BTreeMap::new();
    let mut excerpt = None;
    for line in text.lines() {
        let (key, value) = line.split_once(": ")?;
        match key {
            "id" => id = Some(value.to_string()),
            "excerpt" => excerpt = Some(value.to_string()),
            _ => {
                fields.insert(key.to_string(), value.to_string());
            }
        }
    }
    Some(SearchResult {
        id: id?,
        fields,
        excerpt,
    })
}

fn format_asset(asset: &AssetRecord) -> ContentBlock {
    let opt_u64 = |v: Option<u64>| v.map(|x| x.to_string()).unwrap_or_else(|| UNKNOWN.to_string());
    let opt_bool = |v: Option<bool>| v.map(|x| x.to_string()).unwrap_or_else(|| UNKNOWN.to_string());
    let mut text = format!(
        "id: {}\nproject_id: {}\ndataset_id: {}\ntable_id: {}\nasset_type: {}\nrow_count: {}\nhas_pii: {}\nhas_phi: {}",
        asset.id(),
        asset.project_id,
        asset.dataset_id,
        asset.table_id,
        asset.asset_type,
        opt_u64(asset.row_count),
        opt_bool(asset.has_pii),
        opt_bool(asset.has_phi),
    );
    if let Some(ref description) = asset.description {
        text.push_str(&format!("\ndescription: {}", description.replace('\n', " ")));
    }
    ContentBlock::text(text)
}

/// The single error-formatting funnel: every failure becomes a block whose
/// text carries the `"error"` marker callers scan for.
pub fn format_error(e: &Error) -> ContentBlock {
    ContentBlock::text(format!("error: {e}"))
}

/// Tool descriptors exposed via `GET /mcp/tools`, in OpenAI
/// function-calling schema form.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        serde_json::json!({
            "name": "query_data_assets",
            "description": "Search data assets (tables) by free text and structured filters",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Natural-language search query; may embed project:/dataset:/PII hints" },
                    "project_id": { "type": "string" },
                    "dataset_id": { "type": "string" },
                    "has_pii": { "type": "boolean" },
                    "page_size": { "type": "integer", "default": 10 },
                    "page_token": { "type": "string" },
                    "include_full_content": { "type": "boolean", "default": false }
                },
                "required": ["query"]
            }
        }),
        serde_json::json!({
            "name": "get_asset_details",
            "description": "Resolve one table to rich metadata, optionally with lineage and usage reports",
            "parameters": {
                "type": "object",
                "properties": {
                    "project_id": { "type": "string" },
                    "dataset_id": { "type": "string" },
                    "table_id": { "type": "string" },
                    "include_lineage": { "type": "boolean", "default": false },
                    "include_usage": { "type": "boolean", "default": false },
                    "run_timestamp": { "type": "string", "description": "Discovery run to read reports from; defaults to latest" }
                },
                "required": ["project_id", "dataset_id", "table_id"]
            }
        }),
        serde_json::json!({
            "name": "list_datasets",
            "description": "List datasets visible to a project, optionally with table counts and cost estimates",
            "parameters": {
                "type": "object",
                "properties": {
                    "project_id": { "type": "string" },
                    "include_table_counts": { "type": "boolean", "default": false },
                    "include_costs": { "type": "boolean", "default": false },
                    "page_size": { "type": "integer" }
                },
                "required": []
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::config::{CatalogConfig, SearchConfig, ServerConfig, ValidatorConfig};
    use crate::index::MemoryIndex;

    fn config() -> Arc<Config> {
        Arc::new(Config {
            catalog: CatalogConfig {
                project_id: "acme".to_string(),
                location: "global".to_string(),
                datastore_id: "assets".to_string(),
                reports_base_url: None,
            },
            search: SearchConfig::default(),
            validator: ValidatorConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:7410".to_string(),
            },
        })
    }

    fn doc(project: &str, dataset: &str, table: &str, pii: bool, content: &str) -> Value {
        serde_json::json!({
            "id": format!("{project}.{dataset}.{table}"),
            "structData": {
                "project_id": project,
                "dataset_id": dataset,
                "table_id": table,
                "asset_type": "TABLE",
                "row_count": 1000,
                "has_pii": pii,
                "has_phi": false,
            },
            "content": content,
        })
    }

    fn handlers_with(docs: Vec<Value>, catalog: MemoryCatalog) -> Handlers {
        let config = config();
        let search = SearchClient::new(
            Arc::new(MemoryIndex::with_documents(docs)),
            config.search.clone(),
        );
        Handlers::new(config, search, Arc::new(catalog))
    }

    fn handlers() -> Handlers {
        let mut catalog = MemoryCatalog::new();
        catalog.insert_asset(AssetRecord {
            project_id: "acme".into(),
            dataset_id: "core".into(),
            table_id: "customers".into(),
            asset_type: "TABLE".into(),
            row_count: Some(5000),
            has_pii: Some(true),
            has_phi: None,
            description: Some("customer master data".into()),
        });
        catalog.insert_report(
            "acme.core.customers",
            ReportKind::Lineage,
            "latest",
            "# Lineage\nupstream: crm_export",
        );
        handlers_with(
            vec![
                doc("acme", "core", "customers", true, "customer names and emails"),
                doc("acme", "core", "orders", false, "order line items"),
                doc("acme", "ml", "features", false, "model features"),
            ],
            catalog,
        )
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_argument() {
        let h = handlers();
        let err = h.handle("unknown_tool", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_required_keys_rejected() {
        let h = handlers();
        let err = h
            .handle("get_asset_details", &serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            Error::InvalidArgument(msg) => {
                assert!(msg.contains("get_asset_details"), "{msg}");
                assert!(msg.contains("project_id"), "{msg}");
            }
            other => panic!("expected InvalidArgument, got {other:?}"),
        }

        let err = h
            .handle("query_data_assets", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_non_integer_page_size_rejected() {
        let h = handlers();
        let err = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "x", "page_size": "ten" }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_query_formats_results() {
        let h = handlers();
        let blocks = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "customer emails" }),
            )
            .await
            .unwrap();
        assert!(!blocks.is_empty());
        assert!(blocks[0].text.starts_with("id: acme.core.customers"));
        assert!(blocks[0].text.contains("has_pii: true"));
    }

    #[tokio::test]
    async fn test_query_hint_and_explicit_filter_flow() {
        let h = handlers();
        // Explicit args become filters ANDed onto the wildcard query.
        let blocks = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "*", "has_pii": true, "dataset_id": "core" }),
            )
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.contains("table_id: customers"));
    }

    #[tokio::test]
    async fn test_query_pagination_token_appended_and_accepted() {
        let h = handlers();
        let blocks = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "*", "page_size": 2 }),
            )
            .await
            .unwrap();
        let token_block = blocks.last().unwrap();
        let token = token_block
            .text
            .strip_prefix("next_page_token: ")
            .expect("continuation token block");

        let rest = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "*", "page_size": 2, "page_token": token }),
            )
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn test_query_zero_matches_message() {
        let h = handlers();
        let blocks = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "zzz-no-such-thing" }),
            )
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.contains("No matching data assets"));
    }

    #[tokio::test]
    async fn test_details_with_lineage() {
        let h = handlers();
        let blocks = h
            .handle(
                "get_asset_details",
                &serde_json::json!({
                    "project_id": "acme",
                    "dataset_id": "core",
                    "table_id": "customers",
                    "include_lineage": true,
                    "include_usage": true,
                }),
            )
            .await
            .unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].text.contains("row_count: 5000"));
        assert!(blocks[0].text.contains("has_phi: unknown"));
        assert!(blocks[1].text.contains("upstream: crm_export"));
        // Usage report was never written; field degrades, call succeeds.
        assert!(blocks[2].text.contains("usage report not found"));
    }

    #[tokio::test]
    async fn test_details_rejects_garbage_run_timestamp() {
        let h = handlers();
        let err = h
            .handle(
                "get_asset_details",
                &serde_json::json!({
                    "project_id": "acme",
                    "dataset_id": "core",
                    "table_id": "customers",
                    "run_timestamp": "yesterday-ish",
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // Both the alias and concrete timestamps are accepted.
        for run in ["latest", "2026-08-01", "2026-08-01T12:30:00Z"] {
            h.handle(
                "get_asset_details",
                &serde_json::json!({
                    "project_id": "acme",
                    "dataset_id": "core",
                    "table_id": "customers",
                    "run_timestamp": run,
                }),
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_details_not_found_block() {
        let h = handlers();
        let blocks = h
            .handle(
                "get_asset_details",
                &serde_json::json!({
                    "project_id": "acme",
                    "dataset_id": "core",
                    "table_id": "missing",
                }),
            )
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.contains("not found"), "{}", blocks[0].text);
    }

    #[tokio::test]
    async fn test_list_datasets_defaults_to_configured_project() {
        let mut catalog = MemoryCatalog::new();
        for table in ["a", "b"] {
            catalog.insert_asset(AssetRecord {
                project_id: "acme".into(),
                dataset_id: "core".into(),
                table_id: table.into(),
                asset_type: "TABLE".into(),
                row_count: None,
                has_pii: None,
                has_phi: None,
                description: None,
            });
        }
        let h = handlers_with(vec![], catalog);
        let blocks = h
            .handle(
                "list_datasets",
                &serde_json::json!({ "include_table_counts": true, "include_costs": true }),
            )
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.contains("dataset_id: core"));
        assert!(blocks[0].text.contains("table_count: 2"));
        // No cost blob: unknown, not an error.
        assert!(blocks[0].text.contains("monthly_cost_usd: unknown"));
    }

    #[tokio::test]
    async fn test_list_datasets_page_size_bounds() {
        let h = handlers();
        for n in [0, -1, 101] {
            let err = h
                .handle("list_datasets", &serde_json::json!({ "page_size": n }))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "page_size {n}");
        }
        h.handle("list_datasets", &serde_json::json!({ "page_size": 100 }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_funnel_produces_error_block() {
        let h = handlers();
        let blocks = h.handle_call("no_such_tool", &serde_json::json!({})).await;
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.to_lowercase().contains("error"));

        let blocks = h
            .handle_call("query_data_assets", &serde_json::json!({ "query": "x", "page_size": 0 }))
            .await;
        assert!(blocks[0].text.to_lowercase().contains("error"));
    }

    #[tokio::test]
    async fn test_result_block_roundtrip() {
        let h = handlers();
        let blocks = h
            .handle(
                "query_data_assets",
                &serde_json::json!({ "query": "order line items" }),
            )
            .await
            .unwrap();
        let parsed = parse_result_block(&blocks[0].text).unwrap();
        assert_eq!(parsed.id, "acme.core.orders");
        assert_eq!(parsed.fields["project_id"], "acme");
        assert_eq!(parsed.fields["dataset_id"], "core");
        assert_eq!(parsed.fields["has_pii"], "false");
    }

    #[test]
    fn test_result_block_roundtrip_with_newlines_in_fields() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("asset_type".to_string(), "TABLE\nEXTERNAL".to_string());
        let result = SearchResult {
            id: "p.d.t".to_string(),
            fields,
            excerpt: Some("line one\nline two".to_string()),
        };
        let parsed = parse_result_block(&format_result(&result, true).text).unwrap();
        assert_eq!(parsed.id, "p.d.t");
        assert_eq!(parsed.fields["asset_type"], "TABLE EXTERNAL");
        assert_eq!(parsed.excerpt.as_deref(), Some("line one line two"));
    }

    #[test]
    fn test_tool_schemas_cover_all_tools() {
        let schemas = tool_schemas();
        let names: Vec<&str> = schemas
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["query_data_assets", "get_asset_details", "list_datasets"]
        );
        for schema in &schemas {
            assert_eq!(schema["parameters"]["type"], "object");
        }
    }
}
