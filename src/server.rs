//! MCP-compatible HTTP server.
//!
//! Exposes the tool surface via a JSON API suitable for LLM-driven clients:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/mcp/tools` | List tools with parameter schemas |
//! | `POST` | `/mcp/call-tool` | Call a tool: `{name, arguments}` |
//!
//! Tool failures do not surface as HTTP errors: `POST /mcp/call-tool`
//! answers `200` with a content block carrying the `"error"` marker, so
//! clients have one failure signal regardless of transport or tool.
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients and cross-origin tool calls.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::models::ContentBlock;
use crate::tools::{tool_schemas, Handlers};

/// Starts the MCP-compatible HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. Concurrent tool invocations are served in
/// parallel tasks; the handlers hold no mutable state, so no locking is
/// involved.
pub async fn run_server(bind: &str, handlers: Arc<Handlers>) -> anyhow::Result<()> {
    let app = build_router(handlers);

    tracing::info!(bind, "MCP server listening");
    println!("MCP server listening on http://{bind}");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(handlers: Arc<Handlers>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/mcp/tools", get(handle_list_tools))
        .route("/mcp/call-tool", post(handle_call_tool))
        .layer(cors)
        .with_state(handlers)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /mcp/tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<serde_json::Value>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: tool_schemas(),
    })
}

// ============ POST /mcp/call-tool ============

#[derive(Deserialize)]
struct CallToolRequest {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct CallToolResponse {
    result: Vec<ContentBlock>,
}

async fn handle_call_tool(
    State(handlers): State<Arc<Handlers>>,
    Json(request): Json<CallToolRequest>,
) -> Json<CallToolResponse> {
    let arguments = if request.arguments.is_null() {
        serde_json::json!({})
    } else {
        request.arguments
    };
    tracing::info!(tool = %request.name, "tool call");
    let result = handlers.handle_call(&request.name, &arguments).await;
    Json(CallToolResponse { result })
}
