//! Captain's log MCP server library logic.

pub mod api;
pub mod api_sse;
pub mod config;
pub mod mcp;
pub mod protocol;
pub mod stdio;
pub mod tools;

use api_sse::SessionManager;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use captains_log::Journal;
use mcp::McpServer;
use std::sync::Arc;
use tools::ToolHandler;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// JSON-RPC dispatcher shared by every transport.
    pub mcp: McpServer,
    /// Open SSE sessions.
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(journal: Journal) -> Self {
        Self {
            mcp: McpServer::new(ToolHandler::new(journal)),
            sessions: SessionManager::new(),
        }
    }
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/mcp", post(api::mcp_handler))
        .route("/sse", get(api_sse::sse_handler))
        .route("/messages", post(api_sse::messages_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
