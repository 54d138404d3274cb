use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use repurpose_molecules::docking::{DockingLigand, DockingService, JobOutput, JobState, JobStatus, PoseResult};
use repurpose_molecules::pdb::{StructureHit, StructureMetadata, StructureSource};
use repurpose_molecules::pubchem::{Compound, CompoundSource};

pub fn compound(cid: u64, smiles: &str) -> Compound {
    Compound {
        cid,
        smiles: smiles.into(),
        iupac_name: format!("compound-{cid}"),
        molecular_formula: String::new(),
    }
}

// ── Structures ────────────────────────────────────────────────────────────────

/// Structure database keyed by exact query string.
#[derive(Default)]
pub struct MockStructures {
    hits: HashMap<String, Vec<StructureHit>>,
    metadata: HashMap<String, StructureMetadata>,
    failing: HashSet<String>,
    searches: Mutex<Vec<String>>,
}

impl MockStructures {
    pub fn new() -> Self {
        Self::default()
    }

    /// `query` returns `id`, which has the given metadata and downloads as `"<id>-blob"`.
    pub fn with_entry(mut self, query: &str, id: &str, has_ligands: bool, resolution: f64) -> Self {
        self.hits
            .entry(query.to_string())
            .or_default()
            .push(StructureHit { id: id.into(), score: 1.0 });
        self.metadata.insert(
            id.to_string(),
            StructureMetadata { resolution: Some(resolution), has_ligands, title: format!("{query} structure") },
        );
        self
    }

    /// Searches for `query` fail outright.
    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructureSource for MockStructures {
    async fn search(&self, protein: &str, max_results: usize) -> Result<Vec<StructureHit>> {
        self.searches.lock().unwrap().push(protein.to_string());
        if self.failing.contains(protein) {
            bail!("structure search for {protein} timed out");
        }
        Ok(self
            .hits
            .get(protein)
            .map(|h| h.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }

    async fn metadata(&self, id: &str) -> Result<StructureMetadata> {
        self.metadata.get(id).cloned().ok_or_else(|| anyhow!("no metadata for {id}"))
    }

    async fn download(&self, id: &str) -> Result<Option<String>> {
        Ok(Some(format!("{id}-blob")))
    }
}

// ── Compounds ─────────────────────────────────────────────────────────────────

/// Small-molecule database keyed by exact name.
#[derive(Default)]
pub struct MockCompounds {
    by_name: HashMap<String, Compound>,
    similar: HashMap<u64, Vec<Compound>>,
    failing: HashSet<String>,
    lookups: Mutex<Vec<String>>,
}

impl MockCompounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str, compound: Compound) -> Self {
        self.by_name.insert(name.to_string(), compound);
        self
    }

    pub fn with_similar(mut self, seed: u64, compounds: Vec<Compound>) -> Self {
        self.similar.insert(seed, compounds);
        self
    }

    /// Lookups of `name` (or similarity searches seeded with it) fail.
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompoundSource for MockCompounds {
    async fn lookup_name(&self, name: &str) -> Result<Option<Compound>> {
        self.lookups.lock().unwrap().push(name.to_string());
        if self.failing.contains(name) {
            bail!("compound service error for {name}");
        }
        Ok(self.by_name.get(name).cloned())
    }

    async fn lookup_cid(&self, cid: u64) -> Result<Option<Compound>> {
        self.lookups.lock().unwrap().push(format!("CID_{cid}"));
        Ok(self
            .by_name
            .values()
            .chain(self.similar.values().flatten())
            .find(|c| c.cid == cid)
            .cloned())
    }

    async fn similar_3d(&self, cid: u64, max_results: usize) -> Result<Vec<Compound>> {
        if self.failing.contains(&cid.to_string()) {
            bail!("similarity search for {cid} failed");
        }
        Ok(self
            .similar
            .get(&cid)
            .map(|c| c.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}

// ── Docking ───────────────────────────────────────────────────────────────────

/// Docking service that completes every job on the first poll.
///
/// Scores are looked up by SMILES (default 0.5). Ligands listed with
/// `failing_submit` are rejected at submission; those listed with
/// `failing_job` produce a `FAILED` job.
#[derive(Default)]
pub struct MockDocking {
    scores: HashMap<String, f64>,
    failing_submit: HashSet<String>,
    failing_job: HashSet<String>,
    jobs: Mutex<HashMap<String, Vec<DockingLigand>>>,
    submissions: Mutex<Vec<Vec<DockingLigand>>>,
    next_id: AtomicUsize,
}

impl MockDocking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, smiles: &str, score: f64) -> Self {
        self.scores.insert(smiles.to_string(), score);
        self
    }

    pub fn failing_submit(mut self, smiles: &str) -> Self {
        self.failing_submit.insert(smiles.to_string());
        self
    }

    pub fn failing_job(mut self, smiles: &str) -> Self {
        self.failing_job.insert(smiles.to_string());
        self
    }

    pub fn submissions(&self) -> Vec<Vec<DockingLigand>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DockingService for MockDocking {
    async fn submit(&self, _structure_b64: &str, ligands: &[DockingLigand]) -> Result<String> {
        self.submissions.lock().unwrap().push(ligands.to_vec());
        if ligands.iter().any(|l| self.failing_submit.contains(&l.smiles)) {
            bail!("RunPod submit error 500: worker unavailable");
        }
        let id = format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().unwrap().insert(id.clone(), ligands.to_vec());
        Ok(id)
    }

    async fn status(&self, job_id: &str) -> Result<JobState> {
        let ligands = self
            .jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown job {job_id}"))?;
        if ligands.iter().any(|l| self.failing_job.contains(&l.smiles)) {
            return Ok(JobState { id: job_id.into(), status: JobStatus::Failed, output: None, error: Some("OOM".into()) });
        }
        let results = ligands
            .iter()
            .map(|l| PoseResult {
                name: l.name.clone(),
                confidence_score: self.scores.get(&l.smiles).copied().unwrap_or(0.5),
                confidence_raw: 0.0,
                all_poses: None,
            })
            .collect();
        Ok(JobState {
            id: job_id.into(),
            status: JobStatus::Completed,
            output: Some(JobOutput { results }),
            error: None,
        })
    }
}
