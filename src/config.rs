use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    pub server: ServerConfig,
}

/// Identifies the managed index and the object store holding enrichment
/// documents. Loaded once at process start; read-only afterwards.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub project_id: String,
    #[serde(default = "default_location")]
    pub location: String,
    pub datastore_id: String,
    /// Base URL for run-keyed enrichment blobs (markdown reports, cost
    /// estimates). Optional: lookups degrade to "not found" without it.
    #[serde(default)]
    pub reports_base_url: Option<String>,
}

fn default_location() -> String {
    "global".to_string()
}

impl CatalogConfig {
    /// Fully-qualified serving configuration path targeted by search requests.
    pub fn serving_config(&self) -> String {
        format!(
            "projects/{}/locations/{}/collections/default_collection/dataStores/{}/servingConfigs/default_search",
            self.project_id, self.location, self.datastore_id
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Upper bound on content excerpts attached to results, in characters.
    #[serde(default = "default_excerpt_max_chars")]
    pub excerpt_max_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            excerpt_max_chars: default_excerpt_max_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_page_size() -> u32 {
    10
}
fn default_max_page_size() -> u32 {
    100
}
fn default_excerpt_max_chars() -> usize {
    400
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_validator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            timeout_secs: default_validator_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_validator_timeout_secs() -> u64 {
    60
}

impl ValidatorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.catalog.project_id.is_empty() {
        anyhow::bail!("catalog.project_id must not be empty");
    }
    if config.catalog.datastore_id.is_empty() {
        anyhow::bail!("catalog.datastore_id must not be empty");
    }

    if config.search.default_page_size < 1 {
        anyhow::bail!("search.default_page_size must be >= 1");
    }
    if config.search.max_page_size < config.search.default_page_size {
        anyhow::bail!("search.max_page_size must be >= search.default_page_size");
    }
    if !(200..=1000).contains(&config.search.excerpt_max_chars) {
        anyhow::bail!("search.excerpt_max_chars must be in [200, 1000]");
    }

    if config.validator.is_enabled() && config.validator.model.is_none() {
        anyhow::bail!(
            "validator.model must be specified when provider is '{}'",
            config.validator.provider
        );
    }

    match config.validator.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown validator provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
