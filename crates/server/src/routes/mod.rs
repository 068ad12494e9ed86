//! API route handlers
//!
//! - `health`: liveness and shard summary
//! - `query`: `/ciq` image queries

pub mod health;
pub mod query;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "CBIR Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /ciq?url=..&lc=..&le=..",
            "POST /ciq?lc=..&le=..",
            "GET /health"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
