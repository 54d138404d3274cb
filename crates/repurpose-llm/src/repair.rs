//! Bounded repair of malformed generated JSON.
//!
//! `parse → repair request → reparse → default`. Exactly one repair request
//! is ever sent.

use repurpose_common::json::{parse_tolerant, JsonShapeError};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::backend::{ask, LlmBackend};

const REPAIR_SYSTEM: &str = "You are a JSON repair assistant. The user will give you malformed \
JSON. Return ONLY the corrected, valid JSON. No explanation.";

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    Direct,
    Repaired,
    Defaulted,
}

/// Parse `raw`; on failure ask the backend to repair it once and reparse.
pub async fn parse_with_repair<T: DeserializeOwned>(
    backend: &dyn LlmBackend,
    raw: &str,
) -> Result<(T, ParseOutcome), JsonShapeError> {
    let first_err = match parse_tolerant::<T>(raw) {
        Ok(v) => return Ok((v, ParseOutcome::Direct)),
        Err(e) => e,
    };
    debug!(error = %first_err, "Generated JSON malformed, requesting repair");

    let repaired = match ask(backend, REPAIR_SYSTEM, raw).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "JSON repair request failed");
            return Err(first_err);
        }
    };
    parse_tolerant::<T>(&repaired).map(|v| (v, ParseOutcome::Repaired))
}

/// [`parse_with_repair`], degrading to `T::default()` when both passes fail.
pub async fn parse_or_default<T: DeserializeOwned + Default>(
    backend: &dyn LlmBackend,
    raw: &str,
) -> (T, ParseOutcome) {
    match parse_with_repair(backend, raw).await {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Generated JSON unusable after repair, using default");
            (T::default(), ParseOutcome::Defaulted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LlmError, LlmRequest, LlmResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed text and counts calls.
    struct Fixed {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for Fixed {
        async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(LlmResponse {
                    content: text.to_string(),
                    model: "fixed".into(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                }),
                None => Err(LlmError::Unavailable("down".into())),
            }
        }
        fn model_id(&self) -> &str { "fixed" }
        fn backend_name(&self) -> &'static str { "fixed" }
        fn max_output_tokens(&self) -> usize { 0 }
    }

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct Drugs {
        drugs: Vec<String>,
    }

    #[tokio::test]
    async fn test_well_formed_needs_no_repair() {
        let backend = Fixed { reply: None, calls: AtomicUsize::new(0) };
        let (v, outcome) = parse_with_repair::<Drugs>(&backend, r#"{"drugs": ["a"]}"#).await.unwrap();
        assert_eq!(v.drugs, ["a"]);
        assert_eq!(outcome, ParseOutcome::Direct);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_repair_attempt() {
        let backend = Fixed { reply: Some(r#"{"drugs": ["b"]}"#), calls: AtomicUsize::new(0) };
        let (v, outcome) = parse_with_repair::<Drugs>(&backend, "drugs: b").await.unwrap();
        assert_eq!(v.drugs, ["b"]);
        assert_eq!(outcome, ParseOutcome::Repaired);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repair_failure_defaults() {
        let backend = Fixed { reply: Some("still not json"), calls: AtomicUsize::new(0) };
        let (v, outcome) = parse_or_default::<Drugs>(&backend, "garbage").await;
        assert_eq!(v, Drugs::default());
        assert_eq!(outcome, ParseOutcome::Defaulted);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
