//! repurpose-ingestion: literature search and the target discovery stage.
//!
//! - Literature sources (arXiv, Europe PMC) behind `LiteratureSource`
//! - Paper deduplication across queries
//! - `DiscoveryStage`: review, protein targets and candidate drugs for a condition

pub mod sources;
pub mod dedup;
pub mod models;
pub mod pipeline;

pub use models::{Paper, PaperSource};
pub use pipeline::DiscoveryStage;
pub use sources::LiteratureSource;
