//! repurpose-web: HTTP surface for the repurposing pipeline.
//!
//! Streamed stages (review, structures, dock, pipeline) answer with
//! Server-Sent Events that always end in a `complete` or `error` event.
//! The single-shot stages (analyze, expand, report, paper, chat) answer
//! with one JSON body.

pub mod error;
pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;

pub use router::build_router;
pub use state::{AppState, SharedState};
