//! # Asset Scout CLI (`ascout`)
//!
//! The `ascout` binary fronts the same tool surface the MCP server exposes:
//! searching data assets, resolving asset details, listing datasets,
//! validating schema fit, and serving the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! ascout --config ./config/ascout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ascout search "<query>"` | Search indexed data assets |
//! | `ascout get <project> <dataset> <table>` | Resolve one asset to rich metadata |
//! | `ascout datasets` | List datasets visible to a project |
//! | `ascout validate` | Judge schema fit for a candidate source table |
//! | `ascout serve` | Start the MCP-compatible HTTP server |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use asset_scout::catalog::RemoteCatalog;
use asset_scout::config;
use asset_scout::index::DiscoveryIndex;
use asset_scout::models::ContentBlock;
use asset_scout::search_client::SearchClient;
use asset_scout::server;
use asset_scout::tools::Handlers;
use asset_scout::validator::{OpenAiModel, SchemaValidator, SourceColumn, TargetColumn};

/// Asset Scout — semantic discovery and search over warehouse table metadata.
#[derive(Parser)]
#[command(
    name = "ascout",
    about = "Asset Scout — semantic discovery and search over warehouse table metadata",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ascout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search indexed data assets.
    ///
    /// The query may embed filter hints (`project:<id>`, `dataset:<id>`,
    /// PII phrasing); explicit flags take precedence over hints.
    Search {
        /// The search query. `*` or empty matches broadly.
        query: String,

        /// Restrict to a project.
        #[arg(long)]
        project: Option<String>,

        /// Restrict to a dataset.
        #[arg(long)]
        dataset: Option<String>,

        /// Only assets flagged as containing PII.
        #[arg(long)]
        has_pii: bool,

        /// Results per page (default 10).
        #[arg(long)]
        page_size: Option<i64>,

        /// Continuation token from a previous page.
        #[arg(long)]
        page_token: Option<String>,

        /// Include full content excerpts instead of the short form.
        #[arg(long)]
        full_content: bool,
    },

    /// Resolve one asset to rich metadata.
    Get {
        project_id: String,
        dataset_id: String,
        table_id: String,

        /// Include the lineage report.
        #[arg(long)]
        lineage: bool,

        /// Include the usage report.
        #[arg(long)]
        usage: bool,

        /// Discovery run to read reports from (defaults to latest).
        #[arg(long)]
        run_timestamp: Option<String>,
    },

    /// List datasets visible to a project.
    Datasets {
        /// Project to list (defaults to the configured project).
        #[arg(long)]
        project: Option<String>,

        /// Include per-dataset table counts.
        #[arg(long)]
        table_counts: bool,

        /// Include monthly cost estimates.
        #[arg(long)]
        costs: bool,

        /// Maximum datasets to print.
        #[arg(long)]
        page_size: Option<i64>,
    },

    /// Judge whether a candidate source schema fits a target column group.
    ///
    /// Reads JSON column lists: source as `[{name, type}]`, target as
    /// `[{name, type, description}]`. Prints the verdict; an unreachable
    /// model degrades to "not a fit".
    Validate {
        /// Path to the source schema JSON.
        #[arg(long)]
        source: PathBuf,

        /// Path to the target columns JSON.
        #[arg(long)]
        target: PathBuf,

        /// Conceptual group the target columns belong to.
        #[arg(long)]
        group: String,

        /// Source table name, for the prompt and logs.
        #[arg(long)]
        table: String,
    },

    /// Start the MCP-compatible HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(config::load_config(&cli.config)?);

    // One HTTP client per process, shared by the index, catalog, and model
    // backends.
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let index = Arc::new(DiscoveryIndex::new(http.clone(), &config.catalog));
    let search = SearchClient::new(index.clone(), config.search.clone());
    let catalog = Arc::new(RemoteCatalog::new(
        index,
        http.clone(),
        config.catalog.reports_base_url.clone(),
        config.search.timeout_secs,
    ));
    let handlers = Arc::new(Handlers::new(config.clone(), search, catalog));

    match cli.command {
        Commands::Search {
            query,
            project,
            dataset,
            has_pii,
            page_size,
            page_token,
            full_content,
        } => {
            let mut arguments = serde_json::json!({ "query": query });
            if let Some(project) = project {
                arguments["project_id"] = project.into();
            }
            if let Some(dataset) = dataset {
                arguments["dataset_id"] = dataset.into();
            }
            if has_pii {
                arguments["has_pii"] = true.into();
            }
            if let Some(page_size) = page_size {
                arguments["page_size"] = page_size.into();
            }
            if let Some(page_token) = page_token {
                arguments["page_token"] = page_token.into();
            }
            if full_content {
                arguments["include_full_content"] = true.into();
            }
            print_blocks(&handlers.handle_call("query_data_assets", &arguments).await);
        }

        Commands::Get {
            project_id,
            dataset_id,
            table_id,
            lineage,
            usage,
            run_timestamp,
        } => {
            let mut arguments = serde_json::json!({
                "project_id": project_id,
                "dataset_id": dataset_id,
                "table_id": table_id,
                "include_lineage": lineage,
                "include_usage": usage,
            });
            if let Some(run_timestamp) = run_timestamp {
                arguments["run_timestamp"] = run_timestamp.into();
            }
            print_blocks(&handlers.handle_call("get_asset_details", &arguments).await);
        }

        Commands::Datasets {
            project,
            table_counts,
            costs,
            page_size,
        } => {
            let mut arguments = serde_json::json!({
                "include_table_counts": table_counts,
                "include_costs": costs,
            });
            if let Some(project) = project {
                arguments["project_id"] = project.into();
            }
            if let Some(page_size) = page_size {
                arguments["page_size"] = page_size.into();
            }
            print_blocks(&handlers.handle_call("list_datasets", &arguments).await);
        }

        Commands::Validate {
            source,
            target,
            group,
            table,
        } => {
            if !config.validator.is_enabled() {
                anyhow::bail!("validator is disabled; set [validator] provider in config");
            }
            let source_schema: Vec<SourceColumn> = serde_json::from_str(
                &std::fs::read_to_string(&source)
                    .with_context(|| format!("Failed to read {}", source.display()))?,
            )
            .context("Failed to parse source schema JSON")?;
            let target_columns: Vec<TargetColumn> = serde_json::from_str(
                &std::fs::read_to_string(&target)
                    .with_context(|| format!("Failed to read {}", target.display()))?,
            )
            .context("Failed to parse target columns JSON")?;

            let model = Arc::new(OpenAiModel::new(http, &config.validator)?);
            let validator = SchemaValidator::new(model, &config.validator);
            let fit = validator
                .validate_schema(&source_schema, &target_columns, &group, &table)
                .await;
            println!("table: {table}");
            println!("group: {group}");
            println!("is_good_fit: {fit}");
        }

        Commands::Serve => {
            server::run_server(&config.server.bind, handlers).await?;
        }
    }

    Ok(())
}

fn print_blocks(blocks: &[ContentBlock]) {
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", block.text);
    }
}
