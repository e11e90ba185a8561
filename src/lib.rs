//! # Asset Scout
//!
//! Semantic discovery and search over warehouse table metadata.
//!
//! Asset Scout indexes profiled metadata about tabular data assets and lets
//! LLM-driven clients search it with free text plus structured constraints
//! ("find tables with PII", "analytics tables in project X"). Queries are
//! compiled into a structured request against a managed semantic index and
//! results come back as a stable, paginated content-block contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Handlers │──▶│ Query Builder │──▶│ Search Client │──▶│ Semantic    │
//! │ (tools)  │   │ hints+filters │   │ page+normalize│   │ index       │
//! └────┬─────┘   └───────────────┘   └───────────────┘   └─────────────┘
//!      │
//!      ├──▶ Catalog (direct lookups, reports, datasets)
//!      └──▶ Validator (schema fit via generative model, offline path)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error taxonomy |
//! | [`models`] | Search query/result value objects, content blocks |
//! | [`query`] | Query builder with filter-hint extraction |
//! | [`index`] | Index backends (remote and in-memory) |
//! | [`search_client`] | Page execution and hit normalization |
//! | [`catalog`] | Asset/dataset direct lookups and enrichment reports |
//! | [`validator`] | Schema compatibility validation |
//! | [`tools`] | Tool dispatch, argument validation, formatting |
//! | [`server`] | MCP-compatible HTTP server |

pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod search_client;
pub mod server;
pub mod tools;
pub mod validator;
