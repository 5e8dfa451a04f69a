//! HTTP handlers for the streamable JSON-RPC endpoint.

use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
///
/// Protocol-level failures travel inside JSON-RPC responses; this type only
/// covers requests that never reach the dispatcher.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Handler for `GET /health`.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `POST /mcp`.
///
/// Takes one JSON-RPC message and answers it in the response body.
/// Notifications are acknowledged with `202 Accepted` and no body.
pub async fn mcp_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: String,
) -> Result<Response, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("empty request body".to_string()));
    }

    match state.mcp.handle_message(&body).await {
        Some(response) => Ok(Json(response).into_response()),
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}
