//! repurpose-llm: text-completion oracle abstraction.
//!
//! `LlmBackend` is the seam every prompt in the pipeline goes through;
//! `provider` picks a concrete backend from configuration and wraps it in
//! the audit layer.

pub mod audit;
pub mod backend;
pub mod provider;
pub mod repair;

pub use backend::{ask, LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use provider::{build_backend, LlmProvider, LlmSettings};
pub use repair::{parse_or_default, parse_with_repair, ParseOutcome};
