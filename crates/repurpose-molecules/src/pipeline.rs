//! Docking stage: submit every (protein, ligand batch) pair to the docking
//! service, poll to completion and merge the results into one ranked list.
//!
//! Targets dock concurrently and so do the batches within a target. A
//! failed batch is reported as a `batch_error` event and contributes no
//! results; only an empty target list fails the stage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use repurpose_common::confidence::{clamp_confidence, rank_descending};
use repurpose_common::events::{DockEvent, DockingOutput};
use repurpose_common::{DockingResult, DockingTarget, EventSink, Provenance, RepurposeError, Result};
use tracing::{info, instrument, warn};

use crate::docking::{wait_for_job, DockingLigand, DockingService, PoseResult, SafeNameMap};

#[derive(Debug, Clone)]
pub struct DockingOptions {
    /// Ligands per submitted job.
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// Ceiling on how long one job may be polled.
    pub max_wait: Duration,
}

impl Default for DockingOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(600),
        }
    }
}

pub struct DockingStage {
    service: Arc<dyn DockingService>,
    options: DockingOptions,
}

impl DockingStage {
    pub fn new(service: Arc<dyn DockingService>) -> Self {
        Self { service, options: DockingOptions::default() }
    }

    pub fn with_options(mut self, options: DockingOptions) -> Self {
        self.options = options;
        self
    }

    #[instrument(skip_all, fields(targets = targets.len(), round))]
    pub async fn run(
        &self,
        targets: &[DockingTarget],
        round: u32,
        sink: &EventSink<DockEvent>,
    ) -> Result<DockingOutput> {
        if targets.is_empty() {
            return Err(RepurposeError::InvalidInput("dockingTargets is required".into()));
        }
        if round == 0 {
            return Err(RepurposeError::InvalidInput("round starts at 1".into()));
        }

        let per_target = join_all(targets.iter().map(|t| self.dock_target(t, round, sink))).await;

        // Concatenate in target order so equal scores keep discovery order.
        let mut all_results: Vec<DockingResult> = per_target.into_iter().flatten().collect();
        rank_descending(&mut all_results);

        info!(round, results = all_results.len(), "Docking round complete");
        Ok(DockingOutput { all_results })
    }

    async fn dock_target(
        &self,
        target: &DockingTarget,
        round: u32,
        sink: &EventSink<DockEvent>,
    ) -> Vec<DockingResult> {
        let protein = target.protein.name.as_str();
        let skip = |reason: String| {
            warn!(protein, reason = %reason, "Skipping docking target");
            sink.emit(DockEvent::Skipped { protein: protein.to_string(), reason });
        };

        let Some(structure) = target.protein.structure_blob.as_deref().filter(|b| !b.is_empty()) else {
            skip(format!("No PDB data for {protein}, skipping"));
            return Vec::new();
        };
        let names = SafeNameMap::new(&target.ligands);
        if names.is_empty() {
            skip(format!("No valid ligands for {protein}, skipping"));
            return Vec::new();
        }

        let total = names.len();
        sink.emit(DockEvent::Progress {
            protein: protein.to_string(),
            drug_index: 0,
            drug_total: total,
            message: format!("Starting docking for {protein} ({total} ligands)"),
        });

        let batches: Vec<&[DockingLigand]> = names.ligands().chunks(self.options.batch_size.max(1)).collect();
        let batch_count = batches.len();
        let docked = AtomicUsize::new(0);

        let jobs = batches.iter().enumerate().map(|(i, batch)| {
            let docked = &docked;
            async move {
                let ligands: Vec<String> = batch.iter().map(|l| l.name.clone()).collect();
                let fail = |stage: &str, e: anyhow::Error| {
                    warn!(protein, batch = i + 1, error = %e, "Docking batch {stage} failed");
                    sink.emit(DockEvent::BatchError {
                        protein: protein.to_string(),
                        ligands: ligands.clone(),
                        message: format!("Chunk {}/{batch_count} {stage} failed for {protein}: {e}", i + 1),
                    });
                };

                let job_id = match self.service.submit(structure, batch).await {
                    Ok(id) => id,
                    Err(e) => {
                        fail("submission", e);
                        return Vec::new();
                    }
                };
                sink.emit(DockEvent::Progress {
                    protein: protein.to_string(),
                    drug_index: docked.load(Ordering::SeqCst),
                    drug_total: total,
                    message: format!("Submitted chunk {}/{batch_count} for {protein}", i + 1),
                });

                match wait_for_job(
                    self.service.as_ref(),
                    &job_id,
                    self.options.poll_interval,
                    self.options.max_wait,
                )
                .await
                {
                    Ok(poses) => {
                        let done = docked.fetch_add(batch.len(), Ordering::SeqCst) + batch.len();
                        sink.emit(DockEvent::Progress {
                            protein: protein.to_string(),
                            drug_index: done,
                            drug_total: total,
                            message: format!("Chunk {}/{batch_count} complete for {protein}", i + 1),
                        });
                        poses
                    }
                    Err(e) => {
                        fail("job", e);
                        Vec::new()
                    }
                }
            }
        });

        let poses: Vec<PoseResult> = join_all(jobs).await.into_iter().flatten().collect();
        let mut results: Vec<DockingResult> = poses
            .into_iter()
            .filter_map(|pose| attach_metadata(pose, &names, target, round))
            .collect();
        rank_descending(&mut results);

        sink.emit(DockEvent::TargetComplete { protein: protein.to_string(), results: results.clone() });
        results
    }
}

/// Map a returned pose back to its ligand record. Poses with a NaN score
/// are dropped.
fn attach_metadata(
    pose: PoseResult,
    names: &SafeNameMap,
    target: &DockingTarget,
    round: u32,
) -> Option<DockingResult> {
    let original = names.original(&pose.name);
    let ligand_name = original.map(|l| l.name.clone()).unwrap_or_else(|| pose.name.clone());
    let confidence_score = clamp_confidence(pose.confidence_score, &ligand_name)?;
    Some(DockingResult {
        ligand_name,
        confidence_score,
        confidence_raw: pose.confidence_raw,
        mechanism: original.map(|l| l.mechanism.clone()).unwrap_or_default(),
        regulatory_status: original.map(|l| l.regulatory_status.clone()).unwrap_or_default(),
        provenance: original
            .map(|l| l.provenance.clone())
            .unwrap_or_else(|| Provenance::Other(String::new())),
        protein_target: target.protein.name.clone(),
        structure_id: target.protein.resolved_structure_id.clone().unwrap_or_default(),
        round,
        poses: pose.all_poses,
    })
}
