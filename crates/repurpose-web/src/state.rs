//! Shared application state for the web server.

use std::sync::Arc;

use repurpose_orchestrator::{Oracles, PipelineOptions};

/// Injected into every handler. Holds no per-run data: every request
/// carries the state it needs.
pub struct AppState {
    pub oracles: Oracles,
    pub options: PipelineOptions,
}

impl AppState {
    pub fn new(oracles: Oracles, options: PipelineOptions) -> Self {
        Self { oracles, options }
    }
}

pub type SharedState = Arc<AppState>;
