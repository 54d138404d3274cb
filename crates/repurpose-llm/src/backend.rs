//! Text-completion backend trait and concrete implementations.
//!
//! Backends:
//!   PerplexityBackend      : Perplexity chat completions (sonar-pro, web-grounded)
//!   OpenAiCompatibleBackend: any OpenAI-compatible endpoint (OpenAI, vLLM, LMStudio, …)
//!   AnthropicBackend       : Anthropic Messages API (claude-*)
//!
//! All backends send through a [`SandboxClient`], so only allowlisted hosts
//! are reachable.

use std::time::Duration;

use async_trait::async_trait;
use repurpose_common::{RepurposeError, SandboxClient};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

/// Generation requests are slow; a full review section can take minutes.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Request blocked: {0}")]
    Blocked(#[from] RepurposeError),
}

impl From<LlmError> for RepurposeError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Blocked(inner) => inner,
            other => RepurposeError::oracle("llm", other),
        }
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// The single system + user exchange every pipeline prompt uses.
    pub fn system_user(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![
                Message { role: "system".into(), content: system.into() },
                Message { role: "user".into(), content: user.into() },
            ],
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn backend_name(&self) -> &'static str;
    fn max_output_tokens(&self) -> usize;
}

/// Send a system + user prompt and return the generated text.
pub async fn ask(backend: &dyn LlmBackend, system: &str, user: &str) -> Result<String, LlmError> {
    let resp = backend.complete(LlmRequest::system_user(system, user)).await?;
    Ok(resp.content)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status >= 400 {
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| text.chars().take(300).collect());
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(serde_json::from_str(&text)?)
}

// ── 1. Perplexity ─────────────────────────────────────────────────────────────

pub const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const PERPLEXITY_DEFAULT_MODEL: &str = "sonar-pro";

pub struct PerplexityBackend {
    pub model: String,
    api_key: SecretString,
    client: SandboxClient,
}

impl PerplexityBackend {
    pub fn new(client: SandboxClient, api_key: SecretString, model: impl Into<String>) -> Self {
        Self { model: model.into(), api_key, client }
    }
}

#[async_trait]
impl LlmBackend for PerplexityBackend {
    #[instrument(skip(self, req), fields(model = %self.model))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(LlmError::Unavailable("PERPLEXITY_API_KEY not set".to_string()));
        }
        let body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(8000),
            "temperature": req.temperature.unwrap_or(0.3),
        });
        let resp = self.client
            .post(PERPLEXITY_URL)?
            .bearer_auth(self.api_key.expose_secret())
            .timeout(COMPLETION_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn backend_name(&self) -> &'static str { "perplexity" }
    fn max_output_tokens(&self) -> usize { 8_000 }
}

// ── 2. OpenAI-Compatible (OpenAI, vLLM, LMStudio, OpenRouter, …) ─────────────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<SecretString>,
    client: SandboxClient,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        client: SandboxClient,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self { base_url: base_url.into(), model: model.into(), api_key, client }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k.expose_secret()),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    #[instrument(skip(self, req), fields(model = %self.model, base_url = %self.base_url))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(8000),
            "temperature": req.temperature.unwrap_or(0.3),
        });
        let resp = self
            .auth(self.client.post(&url)?)
            .timeout(COMPLETION_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn backend_name(&self) -> &'static str { "openai_compatible" }
    fn max_output_tokens(&self) -> usize { 8_192 }
}

// ── 3. Anthropic (claude-*) ───────────────────────────────────────────────────

pub struct AnthropicBackend {
    pub model: String,
    api_key: SecretString,
    client: SandboxClient,
}

impl AnthropicBackend {
    pub fn new(client: SandboxClient, api_key: SecretString, model: impl Into<String>) -> Self {
        Self { api_key, model: model.into(), client }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    #[instrument(skip(self, req), fields(model = %self.model))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Messages API takes the system prompt separately
        let system = req.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let messages: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        let model = req.model.as_deref().unwrap_or(&self.model);

        let mut body = serde_json::json!({
            "model":       model,
            "messages":    messages,
            "max_tokens":  req.max_tokens.unwrap_or(8000),
            "temperature": req.temperature.unwrap_or(0.3),
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.to_string());
        }

        let resp = self.client
            .post("https://api.anthropic.com/v1/messages")?
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .timeout(COMPLETION_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let json = check_response_status(resp).await?;

        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks.iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: json["model"].as_str().unwrap_or(model).to_string(),
            prompt_tokens:     json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn backend_name(&self) -> &'static str { "anthropic" }
    fn max_output_tokens(&self) -> usize { 8_192 }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> SandboxClient {
        SandboxClient::new().unwrap()
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "model": "sonar-pro",
            "choices": [{"message": {"content": "EGFR, KRAS"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        });
        let r = parse_openai_response(&json, "fallback");
        assert_eq!(r.content, "EGFR, KRAS");
        assert_eq!(r.model, "sonar-pro");
        assert_eq!(r.completion_tokens, 4);

        let r = parse_openai_response(&serde_json::json!({}), "fallback");
        assert_eq!(r.content, "");
        assert_eq!(r.model, "fallback");
    }

    #[test]
    fn test_system_user_request() {
        let req = LlmRequest::system_user("be terse", "list targets");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].content, "list targets");
    }

    #[test]
    fn test_backend_names() {
        let p = PerplexityBackend::new(sandbox(), SecretString::from("pplx-test"), PERPLEXITY_DEFAULT_MODEL);
        assert_eq!(p.model_id(), "sonar-pro");
        assert_eq!(p.backend_name(), "perplexity");
        let a = AnthropicBackend::new(sandbox(), SecretString::from("sk-ant-test"), "claude-sonnet-4-5");
        assert_eq!(a.backend_name(), "anthropic");
    }

    #[tokio::test]
    async fn test_missing_perplexity_key_is_unavailable() {
        let p = PerplexityBackend::new(sandbox(), SecretString::from(""), PERPLEXITY_DEFAULT_MODEL);
        let err = p.complete(LlmRequest::system_user("s", "u")).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_disallowed_host_is_blocked() {
        let b = OpenAiCompatibleBackend::new(sandbox(), "https://llm.example.invalid", "m", None);
        let err = b.complete(LlmRequest::system_user("s", "u")).await.unwrap_err();
        assert!(matches!(err, LlmError::Blocked(RepurposeError::SecurityError(_))));
    }

    #[test]
    fn test_llm_error_maps_to_oracle_error() {
        let err: RepurposeError = LlmError::ApiError { status: 429, message: "slow down".into() }.into();
        assert!(err.to_string().contains("Oracle error (llm)"));
    }
}
