//! GPU docking via a RunPod serverless endpoint (DiffDock-style confidence
//! scoring), plus the safe-name mapping used to submit ligands.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use repurpose_common::Ligand;
use repurpose_common::SandboxClient as Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

const RUNPOD_API_BASE: &str = "https://api.runpod.ai/v2";
pub const DEFAULT_ENDPOINT_ID: &str = "5h7ezi9wyaqk5u";
pub const DEFAULT_SAMPLES_PER_COMPLEX: u32 = 10;
pub const SAFE_NAME_MAX_LEN: usize = 80;
const SAFE_NAME_PREFIX_LEN: usize = 30;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockingLigand {
    pub name: String,
    pub smiles: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseResult {
    pub name: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub confidence_raw: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_poses: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    #[serde(default)]
    pub results: Vec<PoseResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: Option<JobOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Job-submission/polling docking compute service.
#[async_trait]
pub trait DockingService: Send + Sync {
    /// Submit one batch against a base64-encoded receptor. Returns the job id.
    async fn submit(&self, structure_b64: &str, ligands: &[DockingLigand]) -> Result<String>;
    async fn status(&self, job_id: &str) -> Result<JobState>;
}

/// Poll `job_id` until it reaches a terminal state or `max_wait` elapses.
pub async fn wait_for_job(
    service: &dyn DockingService,
    job_id: &str,
    poll_interval: Duration,
    max_wait: Duration,
) -> Result<Vec<PoseResult>> {
    let started = Instant::now();
    loop {
        let state = service.status(job_id).await?;
        match state.status {
            JobStatus::Completed => {
                let results = state.output.map(|o| o.results).unwrap_or_default();
                debug!(job_id, count = results.len(), "Docking job completed");
                return Ok(results);
            }
            status if status.is_failure() => {
                let detail = state.error.map(|e| format!(": {e}")).unwrap_or_default();
                bail!("docking job {job_id} {status:?}{detail}");
            }
            _ => {}
        }
        if started.elapsed() + poll_interval > max_wait {
            bail!("docking job {job_id} still {:?} after {}s", state.status, max_wait.as_secs());
        }
        tokio::time::sleep(poll_interval).await;
    }
}

// ── Safe names ────────────────────────────────────────────────────────────────

fn is_forbidden(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Filesystem-safe form of a ligand name. Names still longer than `max_len`
/// become `lig<idx>_<first 30 chars, alphanumerics only>`.
pub fn safe_ligand_name(name: &str, idx: usize, max_len: usize) -> String {
    let safe: String = name.chars().map(|c| if is_forbidden(c) { '_' } else { c }).collect();
    if safe.chars().count() <= max_len {
        return safe;
    }
    let prefix: String = name
        .chars()
        .take(SAFE_NAME_PREFIX_LEN)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("lig{idx}_{prefix}")
}

/// Submitted names and the ligand records they stand for.
#[derive(Debug, Default)]
pub struct SafeNameMap {
    originals: HashMap<String, Ligand>,
    submitted: Vec<DockingLigand>,
}

impl SafeNameMap {
    /// Only dockable ligands are mapped. Two names that collapse to the same
    /// safe form are told apart with an index suffix.
    pub fn new(ligands: &[Ligand]) -> Self {
        let mut map = Self::default();
        for (idx, ligand) in ligands.iter().filter(|l| l.is_dockable()).enumerate() {
            let base = safe_ligand_name(&ligand.name, idx, SAFE_NAME_MAX_LEN);
            let mut safe = base.clone();
            let mut n = idx;
            while map.originals.contains_key(&safe) {
                safe = format!("{base}_{n}");
                n += 1;
            }
            map.submitted.push(DockingLigand {
                name: safe.clone(),
                smiles: ligand.canonical_structure.clone(),
            });
            map.originals.insert(safe, ligand.clone());
        }
        map
    }

    pub fn ligands(&self) -> &[DockingLigand] {
        &self.submitted
    }

    pub fn original(&self, safe_name: &str) -> Option<&Ligand> {
        self.originals.get(safe_name)
    }

    pub fn len(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }
}

// ── RunPod client ─────────────────────────────────────────────────────────────

pub struct RunPodClient {
    client: Client,
    api_key: SecretString,
    endpoint_id: String,
    samples_per_complex: u32,
}

impl RunPodClient {
    pub fn new(client: Client, api_key: SecretString, endpoint_id: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            endpoint_id: endpoint_id.into(),
            samples_per_complex: DEFAULT_SAMPLES_PER_COMPLEX,
        }
    }

    pub fn with_samples_per_complex(mut self, samples: u32) -> Self {
        self.samples_per_complex = samples;
        self
    }

    fn bearer(&self) -> Result<String> {
        let key = self.api_key.expose_secret();
        if key.trim().is_empty() {
            bail!("RUNPOD_API_KEY not set");
        }
        Ok(format!("Bearer {key}"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", RUNPOD_API_BASE, self.endpoint_id, path)
    }
}

fn submit_body(structure_b64: &str, ligands: &[DockingLigand], samples: u32) -> serde_json::Value {
    serde_json::json!({
        "input": {
            "protein_pdb_b64": structure_b64,
            "ligands": ligands,
            "samples_per_complex": samples,
        }
    })
}

#[async_trait]
impl DockingService for RunPodClient {
    #[instrument(skip(self, structure_b64, ligands), fields(ligands = ligands.len()))]
    async fn submit(&self, structure_b64: &str, ligands: &[DockingLigand]) -> Result<String> {
        let resp = self.client
            .post(&self.url("run"))?
            .timeout(SUBMIT_TIMEOUT)
            .header("Authorization", self.bearer()?)
            .json(&submit_body(structure_b64, ligands, self.samples_per_complex))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("RunPod submit error {status}: {text}");
        }
        let json: serde_json::Value = resp.json().await?;
        let Some(id) = json["id"].as_str() else {
            bail!("RunPod submit response has no job id");
        };
        info!(job_id = id, "Submitted docking job");
        Ok(id.to_string())
    }

    #[instrument(skip(self))]
    async fn status(&self, job_id: &str) -> Result<JobState> {
        let resp = self.client
            .get(&self.url(&format!("status/{job_id}")))?
            .timeout(STATUS_TIMEOUT)
            .header("Authorization", self.bearer()?)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("RunPod status error {status}: {text}");
        }
        Ok(resp.json().await?)
    }
}
