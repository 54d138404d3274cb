//! HTTP handlers, one per stage invocation.

pub mod chat;
pub mod single;
pub mod streamed;

use axum::Json;
use serde_json::{json, Value};

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
