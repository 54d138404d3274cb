//! Provider selection: turn configured settings into a ready backend.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use repurpose_common::SandboxClient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::audit::AuditedBackend;
use crate::backend::{
    AnthropicBackend, LlmBackend, LlmError, OpenAiCompatibleBackend, PerplexityBackend,
    PERPLEXITY_DEFAULT_MODEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Perplexity,
    OpenaiCompatible,
    Anthropic,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "perplexity" => Ok(Self::Perplexity),
            "openai_compatible" | "openai" => Ok(Self::OpenaiCompatible),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown LLM provider: {other}")),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Perplexity => "perplexity",
            Self::OpenaiCompatible => "openai_compatible",
            Self::Anthropic => "anthropic",
        })
    }
}

/// Resolved provider settings. The credential stays wrapped until a backend
/// builds its auth header.
#[derive(Debug, Clone, Default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: Option<String>,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// Build an audited backend for `settings`.
pub fn build_backend(
    settings: &LlmSettings,
    client: &SandboxClient,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let api_key = settings
        .api_key
        .clone()
        .unwrap_or_else(|| SecretString::from(String::new()));
    let has_key = !api_key.expose_secret().trim().is_empty();

    let backend: Arc<dyn LlmBackend> = match settings.provider {
        LlmProvider::Perplexity => Arc::new(PerplexityBackend::new(
            client.clone(),
            api_key,
            settings.model.as_deref().unwrap_or(PERPLEXITY_DEFAULT_MODEL),
        )),
        LlmProvider::OpenaiCompatible => {
            let base_url = settings.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            let mut client = client.clone();
            client.allow_url_host(base_url)?;
            Arc::new(OpenAiCompatibleBackend::new(
                client,
                base_url,
                settings.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL),
                has_key.then_some(api_key),
            ))
        }
        LlmProvider::Anthropic => {
            if !has_key {
                return Err(LlmError::Unavailable("Anthropic API key not set".to_string()));
            }
            Arc::new(AnthropicBackend::new(
                client.clone(),
                api_key,
                settings.model.as_deref().unwrap_or(ANTHROPIC_DEFAULT_MODEL),
            ))
        }
    };

    tracing::info!(
        provider = %settings.provider,
        model = backend.model_id(),
        "Text-completion backend configured"
    );
    Ok(Arc::new(AuditedBackend::new(backend)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Perplexity".parse::<LlmProvider>().unwrap(), LlmProvider::Perplexity);
        assert_eq!("openai".parse::<LlmProvider>().unwrap(), LlmProvider::OpenaiCompatible);
        assert!("gemini".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_build_default_is_perplexity_sonar_pro() {
        let client = SandboxClient::new().unwrap();
        let backend = build_backend(&LlmSettings::default(), &client).unwrap();
        assert_eq!(backend.backend_name(), "perplexity");
        assert_eq!(backend.model_id(), "sonar-pro");
    }

    #[test]
    fn test_anthropic_requires_key() {
        let client = SandboxClient::new().unwrap();
        let settings = LlmSettings { provider: LlmProvider::Anthropic, ..Default::default() };
        assert!(build_backend(&settings, &client).is_err());
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let client = SandboxClient::new().unwrap();
        let settings = LlmSettings {
            provider: LlmProvider::Anthropic,
            api_key: Some(SecretString::from("sk-ant-very-secret")),
            ..Default::default()
        };
        assert!(!format!("{settings:?}").contains("sk-ant-very-secret"));
        let backend = build_backend(&settings, &client).unwrap();
        assert_eq!(backend.backend_name(), "anthropic");
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let client = SandboxClient::new().unwrap();
        let settings = LlmSettings {
            provider: LlmProvider::Anthropic,
            api_key: Some(SecretString::from("   ")),
            ..Default::default()
        };
        assert!(build_backend(&settings, &client).is_err());
    }

    #[test]
    fn test_openai_compatible_allows_custom_host() {
        let client = SandboxClient::new().unwrap();
        let settings = LlmSettings {
            provider: LlmProvider::OpenaiCompatible,
            base_url: Some("http://gpu-box.lan:8000".into()),
            model: Some("qwen2.5-72b".into()),
            ..Default::default()
        };
        let backend = build_backend(&settings, &client).unwrap();
        assert_eq!(backend.model_id(), "qwen2.5-72b");
    }
}
