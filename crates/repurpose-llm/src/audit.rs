//! Audit logging for text-completion calls.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    pub model: String,
    pub backend: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn new(backend: &str, response: &LlmResponse, latency_ms: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(response.content.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            model: response.model.clone(),
            backend: backend.to_string(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            output_hash,
            latency_ms,
            called_at: Utc::now(),
        }
    }
}

/// Wraps a backend and records an audit entry for every completion.
pub struct AuditedBackend {
    inner: Arc<dyn LlmBackend>,
}

impl AuditedBackend {
    pub fn new(inner: Arc<dyn LlmBackend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LlmBackend for AuditedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let started = Instant::now();
        let result = self.inner.complete(req).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(resp) => {
                let entry = LlmAuditEntry::new(self.inner.backend_name(), resp, latency_ms);
                tracing::debug!(
                    audit_id = %entry.id,
                    model = %entry.model,
                    backend = %entry.backend,
                    prompt_tokens = entry.prompt_tokens,
                    completion_tokens = entry.completion_tokens,
                    output_hash = %entry.output_hash,
                    latency_ms,
                    "LLM call"
                );
            }
            Err(e) => {
                tracing::warn!(
                    backend = self.inner.backend_name(),
                    model = self.inner.model_id(),
                    latency_ms,
                    error = %e,
                    "LLM call failed"
                );
            }
        }
        result
    }

    fn model_id(&self) -> &str { self.inner.model_id() }
    fn backend_name(&self) -> &'static str { self.inner.backend_name() }
    fn max_output_tokens(&self) -> usize { self.inner.max_output_tokens() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_hash_is_sha256_hex() {
        let resp = LlmResponse {
            content: "abc".into(),
            model: "sonar-pro".into(),
            prompt_tokens: 1,
            completion_tokens: 1,
        };
        let entry = LlmAuditEntry::new("perplexity", &resp, 10);
        assert_eq!(
            entry.output_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(entry.backend, "perplexity");
    }
}
