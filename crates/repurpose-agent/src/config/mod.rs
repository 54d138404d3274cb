//! Configuration loading for the repurposing pipeline.
//! Reads repurpose.toml from the current directory or the path in the
//! REPURPOSE_CONFIG env var, then applies environment overrides.

use std::path::Path;
use std::time::Duration;

use repurpose_llm::{LlmProvider, LlmSettings};
use repurpose_molecules::docking::{DEFAULT_ENDPOINT_ID, DEFAULT_SAMPLES_PER_COMPLEX};
use repurpose_molecules::DockingOptions;
use repurpose_orchestrator::{ExpansionPolicy, PipelineOptions};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub literature: LiteratureConfig,
    pub docking: DockingConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Credential for the Perplexity provider.
    #[serde(default, deserialize_with = "secret")]
    pub perplexity_api_key: Option<SecretString>,
    /// Credential for every other provider.
    #[serde(default, deserialize_with = "secret")]
    pub api_key: Option<SecretString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteratureKind {
    #[default]
    Arxiv,
    Europepmc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiteratureConfig {
    #[serde(default)]
    pub source: LiteratureKind,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize { 15 }

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self { source: LiteratureKind::default(), max_results: default_max_results() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockingConfig {
    #[serde(default = "default_endpoint_id")]
    pub endpoint_id: String,
    #[serde(default, deserialize_with = "secret")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_samples_per_complex")]
    pub samples_per_complex: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_endpoint_id()         -> String { DEFAULT_ENDPOINT_ID.to_string() }
fn default_poll_interval_secs()  -> u64    { 5 }
fn default_samples_per_complex() -> u32    { DEFAULT_SAMPLES_PER_COMPLEX }
fn default_batch_size()          -> usize  { 1 }
fn default_max_wait_secs()       -> u64    { 600 }

impl Default for DockingConfig {
    fn default() -> Self {
        Self {
            endpoint_id: default_endpoint_id(),
            api_key: None,
            poll_interval_secs: default_poll_interval_secs(),
            samples_per_complex: default_samples_per_complex(),
            batch_size: default_batch_size(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub expansion: ExpansionPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "0.0.0.0:3000".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()).map(SecretString::from))
}

impl Config {
    /// Load from file (if present) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("REPURPOSE_CONFIG").unwrap_or_else(|_| "repurpose.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::debug!(path = %path, "No config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config file {}: {e}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Invalid config: {e}"))
    }

    /// Environment variables win over file values. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = var("REPURPOSE_LLM_PROVIDER") {
            match provider.parse() {
                Ok(p) => self.llm.provider = p,
                Err(e) => tracing::warn!(error = %e, "Ignoring REPURPOSE_LLM_PROVIDER"),
            }
        }
        if let Some(model) = var("REPURPOSE_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(url) = var("REPURPOSE_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(key) = var("PERPLEXITY_API_KEY") {
            self.llm.perplexity_api_key = Some(SecretString::from(key));
        }
        if let Some(key) = var("REPURPOSE_LLM_API_KEY") {
            self.llm.api_key = Some(SecretString::from(key));
        }
        if let Some(key) = var("RUNPOD_API_KEY") {
            self.docking.api_key = Some(SecretString::from(key));
        }
        if let Some(endpoint) = var("RUNPOD_ENDPOINT_ID") {
            self.docking.endpoint_id = endpoint;
        }
        if let Some(bind) = var("REPURPOSE_BIND") {
            self.server.bind = bind;
        }
    }

    /// Provider settings with the credential matching the chosen provider.
    pub fn llm_settings(&self) -> LlmSettings {
        let key = match self.llm.provider {
            LlmProvider::Perplexity => self.llm.perplexity_api_key.as_ref(),
            _ => self.llm.api_key.as_ref(),
        };
        LlmSettings {
            provider: self.llm.provider,
            model: self.llm.model.clone(),
            api_key: key.cloned(),
            base_url: self.llm.base_url.clone(),
        }
    }

    pub fn docking_options(&self) -> DockingOptions {
        DockingOptions {
            batch_size: self.docking.batch_size.max(1),
            poll_interval: Duration::from_secs(self.docking.poll_interval_secs.max(1)),
            max_wait: Duration::from_secs(self.docking.max_wait_secs),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            expansion: self.pipeline.expansion,
            docking: self.docking_options(),
            max_papers: self.literature.max_results,
        }
    }
}
