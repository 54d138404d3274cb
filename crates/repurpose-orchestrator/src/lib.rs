//! repurpose-orchestrator: everything after docking, and the loop around it.
//!
//! - `analyze`: reasoning over docking results, with the round limit
//! - `expansion`: similarity and drug-class expansion with per-protein dedup
//! - `report`: overview tables, generated report and final paper
//! - `controller`: the pipeline that sequences every stage and owns the state

pub mod analyze;
pub mod chat;
pub mod classification;
pub mod controller;
pub mod expansion;
pub mod merge;
pub mod report;

pub use analyze::{Reasoner, ReasoningInput};
pub use chat::{answer, ChatContext};
pub use classification::{classify, ClassCounts, CompoundClass};
pub use controller::{ExpansionPolicy, Oracles, Pipeline, PipelineEvent, PipelineOptions, PipelineOutcome, PipelineState};
pub use expansion::{Expander, ExpansionRequest};
pub use merge::{merge_duplicates, MergedDrug};
pub use report::ReportWriter;
