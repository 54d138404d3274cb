//! repurpose-common: shared types, errors and utilities used across all pipeline crates.

pub mod error;
pub mod entities;
pub mod events;
pub mod confidence;
pub mod json;
pub mod sandbox;

// Re-export commonly used types
pub use entities::{
    CandidateDrug, DockingResult, DockingTarget, ExpansionAction, ExpansionRecord, Ligand,
    ProteinTarget, Provenance, ReasoningDecision, DEFAULT_PROTEIN_TARGETS, MAX_EXPANSION_ROUNDS,
};
pub use error::{RepurposeError, Result};
pub use events::{EventSink, StageEvent};
pub use sandbox::SandboxClient;
