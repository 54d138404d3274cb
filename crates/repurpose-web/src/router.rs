//! Axum router: maps URL paths to handlers.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{chat::chat, health, single, streamed};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health", get(health))

        // Streamed stages (SSE)
        .route("/api/review",     post(streamed::review))
        .route("/api/structures", post(streamed::structures))
        .route("/api/dock",       post(streamed::dock))
        .route("/api/pipeline",   post(streamed::pipeline))

        // Single-response stages
        .route("/api/analyze",    post(single::analyze))
        .route("/api/expand",     post(single::expand))
        .route("/api/report",     post(single::report))
        .route("/api/paper",      post(single::paper))
        .route("/api/chat",       post(chat))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
