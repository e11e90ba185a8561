//! Asset metadata catalog: direct lookups that bypass relevance ranking.
//!
//! The handler layer resolves `(project, dataset, table)` triples to rich
//! metadata, pulls run-keyed enrichment documents (lineage and usage
//! reports), and lists datasets with optional table counts and cost
//! estimates. All of that lives behind [`MetadataCatalog`]:
//!
//! - **[`RemoteCatalog`]** — exact-match filter queries against the search
//!   index plus whole-blob reads from the reports object store.
//! - **[`MemoryCatalog`]** — in-process implementation for tests and demos.
//!
//! Partial availability is the norm here: a missing report or cost blob
//! degrades to `None`, never to an error.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::index::{IndexRequest, SearchIndex};
use crate::models::{FilterClause, FilterValue, SearchQuery};

/// Rich metadata for one asset, resolved by direct lookup.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub asset_type: String,
    pub row_count: Option<u64>,
    pub has_pii: Option<bool>,
    pub has_phi: Option<bool>,
    pub description: Option<String>,
}

impl AssetRecord {
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }

    /// Build a record from a hit's semi-structured payload.
    pub fn from_struct_data(data: &Value) -> Self {
        let text = |key: &str| {
            data.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            project_id: text("project_id"),
            dataset_id: text("dataset_id"),
            table_id: text("table_id"),
            asset_type: {
                let t = text("asset_type");
                if t.is_empty() { "TABLE".to_string() } else { t }
            },
            row_count: data.get("row_count").and_then(|v| v.as_u64()),
            has_pii: data.get("has_pii").and_then(|v| v.as_bool()),
            has_phi: data.get("has_phi").and_then(|v| v.as_bool()),
            description: data
                .get("description")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
        }
    }
}

/// One dataset visible to a project.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub dataset_id: String,
    pub table_count: Option<u64>,
    pub monthly_cost_usd: Option<f64>,
}

/// Which enrichment document to fetch for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Lineage,
    Usage,
}

impl ReportKind {
    fn filename(self) -> &'static str {
        match self {
            ReportKind::Lineage => "lineage.md",
            ReportKind::Usage => "usage.md",
        }
    }
}

#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// Resolve one asset by its identifying triple. `Ok(None)` when absent.
    async fn get_asset(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Option<AssetRecord>>;

    /// Fetch an enrichment document for an asset. `run_timestamp` selects
    /// the discovery run; `None` reads the latest. `Ok(None)` when absent.
    async fn get_report(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        kind: ReportKind,
        run_timestamp: Option<&str>,
    ) -> Result<Option<String>>;

    /// List datasets visible to `project_id`. Table counts and cost
    /// estimates are best-effort: their absence never fails the call.
    async fn list_datasets(
        &self,
        project_id: &str,
        include_table_counts: bool,
        include_costs: bool,
    ) -> Result<Vec<DatasetInfo>>;
}

// ============ Remote catalog ============

/// Catalog backed by the search index (exact-match filters) and the reports
/// object store (whole-blob reads keyed by run id and filename).
pub struct RemoteCatalog {
    index: Arc<dyn SearchIndex>,
    http: reqwest::Client,
    reports_base_url: Option<String>,
    timeout: Duration,
}

impl RemoteCatalog {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        http: reqwest::Client,
        reports_base_url: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            index,
            http,
            reports_base_url: reports_base_url.map(|u| u.trim_end_matches('/').to_string()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn triple_filter(project_id: &str, dataset_id: &str, table_id: &str) -> Result<String> {
        let query = SearchQuery {
            text: String::new(),
            filters: vec![
                FilterClause::new("project_id", FilterValue::Str(project_id.to_string()))?,
                FilterClause::new("dataset_id", FilterValue::Str(dataset_id.to_string()))?,
                FilterClause::new("table_id", FilterValue::Str(table_id.to_string()))?,
            ],
            page_size: 1,
            order_by: None,
        };
        Ok(query.filter_expression().unwrap_or_default())
    }

    async fn fetch_blob(&self, path: &str) -> Result<Option<String>> {
        let base = match self.reports_base_url {
            Some(ref b) => b,
            None => return Ok(None),
        };
        let url = format!("{base}/{path}");
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("report store: {e}")))?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "report store returned {} for {url}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("report store: {e}")))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl MetadataCatalog for RemoteCatalog {
    async fn get_asset(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Option<AssetRecord>> {
        let request = IndexRequest {
            query: String::new(),
            filter: Some(Self::triple_filter(project_id, dataset_id, table_id)?),
            page_size: 1,
            page_token: None,
            order_by: None,
        };
        let response = self.index.search(&request, self.timeout).await?;
        let record = response.results.first().map(|hit| {
            let document = hit.get("document").unwrap_or(hit);
            let data = document.get("structData").cloned().unwrap_or_default();
            AssetRecord::from_struct_data(&data)
        });
        Ok(record)
    }

    async fn get_report(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        kind: ReportKind,
        run_timestamp: Option<&str>,
    ) -> Result<Option<String>> {
        let run = run_timestamp.unwrap_or("latest");
        let path = format!(
            "{run}/{project_id}.{dataset_id}.{table_id}/{}",
            kind.filename()
        );
        self.fetch_blob(&path).await
    }

    async fn list_datasets(
        &self,
        project_id: &str,
        include_table_counts: bool,
        include_costs: bool,
    ) -> Result<Vec<DatasetInfo>> {
        let filter = SearchQuery {
            text: String::new(),
            filters: vec![FilterClause::new(
                "project_id",
                FilterValue::Str(project_id.to_string()),
            )?],
            page_size: 100,
            order_by: None,
        }
        .filter_expression();

        // Aggregate dataset ids (and counts) by walking result pages.
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut page_token: Option<String> = None;
        // Bounded walk; a project with more pages than this is truncated.
        for _ in 0..50 {
            let request = IndexRequest {
                query: String::new(),
                filter: filter.clone(),
                page_size: 100,
                page_token: page_token.clone(),
                order_by: None,
            };
            let response = self.index.search(&request, self.timeout).await?;
            for hit in &response.results {
                let document = hit.get("document").unwrap_or(hit);
                if let Some(dataset) = document
                    .get("structData")
                    .and_then(|d| d.get("dataset_id"))
                    .and_then(|d| d.as_str())
                {
                    *counts.entry(dataset.to_string()).or_insert(0) += 1;
                }
            }
            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        let costs: HashMap<String, f64> = if include_costs {
            match self
                .fetch_blob(&format!("latest/{project_id}/dataset_costs.json"))
                .await
            {
                Ok(Some(body)) => serde_json::from_str(&body).unwrap_or_default(),
                // Cost data is advisory; absence or an unreachable store
                // must not fail the listing.
                Ok(None) => HashMap::new(),
                Err(e) => {
                    tracing::warn!(error = %e, "cost estimates unavailable");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(counts
            .into_iter()
            .map(|(dataset_id, count)| DatasetInfo {
                monthly_cost_usd: costs.get(&dataset_id).copied(),
                table_count: include_table_counts.then_some(count),
                dataset_id,
            })
            .collect())
    }
}

// ============ In-memory catalog ============

/// In-process [`MetadataCatalog`] for tests and demos.
#[derive(Default)]
pub struct MemoryCatalog {
    assets: HashMap<(String, String, String), AssetRecord>,
    reports: HashMap<(String, ReportKind, String), String>,
    costs: HashMap<(String, String), f64>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&mut self, record: AssetRecord) {
        self.assets.insert(
            (
                record.project_id.clone(),
                record.dataset_id.clone(),
                record.table_id.clone(),
            ),
            record,
        );
    }

    pub fn insert_report(
        &mut self,
        asset_id: &str,
        kind: ReportKind,
        run_timestamp: &str,
        body: &str,
    ) {
        self.reports.insert(
            (asset_id.to_string(), kind, run_timestamp.to_string()),
            body.to_string(),
        );
    }

    pub fn insert_cost(&mut self, project_id: &str, dataset_id: &str, monthly_cost_usd: f64) {
        self.costs.insert(
            (project_id.to_string(), dataset_id.to_string()),
            monthly_cost_usd,
        );
    }
}

#[async_trait]
impl MetadataCatalog for MemoryCatalog {
    async fn get_asset(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Option<AssetRecord>> {
        Ok(self
            .assets
            .get(&(
                project_id.to_string(),
                dataset_id.to_string(),
                table_id.to_string(),
            ))
            .cloned())
    }

    async fn get_report(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        kind: ReportKind,
        run_timestamp: Option<&str>,
    ) -> Result<Option<String>> {
        let asset_id = format!("{project_id}.{dataset_id}.{table_id}");
        let run = run_timestamp.unwrap_or("latest").to_string();
        Ok(self.reports.get(&(asset_id, kind, run)).cloned())
    }

    async fn list_datasets(
        &self,
        project_id: &str,
        include_table_counts: bool,
        include_costs: bool,
    ) -> Result<Vec<DatasetInfo>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for (project, dataset, _) in self.assets.keys() {
            if project == project_id {
                *counts.entry(dataset.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(dataset_id, count)| DatasetInfo {
                monthly_cost_usd: if include_costs {
                    self.costs
                        .get(&(project_id.to_string(), dataset_id.clone()))
                        .copied()
                } else {
                    None
                },
                table_count: include_table_counts.then_some(count),
                dataset_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;

    fn record(project: &str, dataset: &str, table: &str) -> AssetRecord {
        AssetRecord {
            project_id: project.to_string(),
            dataset_id: dataset.to_string(),
            table_id: table.to_string(),
            asset_type: "TABLE".to_string(),
            row_count: Some(10),
            has_pii: Some(false),
            has_phi: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_memory_catalog_roundtrip() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert_asset(record("p", "d", "t"));

        let asset = catalog.get_asset("p", "d", "t").await.unwrap().unwrap();
        assert_eq!(asset.id(), "p.d.t");
        assert!(catalog.get_asset("p", "d", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_catalog_list_datasets() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert_asset(record("p", "core", "a"));
        catalog.insert_asset(record("p", "core", "b"));
        catalog.insert_asset(record("p", "ml", "c"));
        catalog.insert_asset(record("other", "x", "y"));
        catalog.insert_cost("p", "core", 42.5);

        let datasets = catalog.list_datasets("p", true, true).await.unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].dataset_id, "core");
        assert_eq!(datasets[0].table_count, Some(2));
        assert_eq!(datasets[0].monthly_cost_usd, Some(42.5));
        assert_eq!(datasets[1].dataset_id, "ml");
        assert!(datasets[1].monthly_cost_usd.is_none());
    }

    #[tokio::test]
    async fn test_remote_catalog_get_asset_via_index() {
        let index = MemoryIndex::with_documents(vec![serde_json::json!({
            "id": "p.d.t",
            "structData": {
                "project_id": "p",
                "dataset_id": "d",
                "table_id": "t",
                "asset_type": "TABLE",
                "row_count": 99,
                "has_pii": true,
            },
        })]);
        let catalog = RemoteCatalog::new(
            Arc::new(index),
            reqwest::Client::new(),
            None,
            5,
        );

        let asset = catalog.get_asset("p", "d", "t").await.unwrap().unwrap();
        assert_eq!(asset.row_count, Some(99));
        assert_eq!(asset.has_pii, Some(true));

        assert!(catalog.get_asset("p", "d", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_catalog_reports_absent_without_base_url() {
        let catalog = RemoteCatalog::new(
            Arc::new(MemoryIndex::new()),
            reqwest::Client::new(),
            None,
            5,
        );
        let report = catalog
            .get_report("p", "d", "t", ReportKind::Lineage, None)
            .await
            .unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_asset_record_from_struct_data_defaults() {
        let record = AssetRecord::from_struct_data(&serde_json::json!({
            "project_id": "p",
            "dataset_id": "d",
            "table_id": "t",
        }));
        assert_eq!(record.asset_type, "TABLE");
        assert!(record.row_count.is_none());
        assert!(record.description.is_none());
    }
}
