//! Structure acquisition stage: one docking target per protein.
//!
//! Proteins are resolved concurrently. Within one protein the structure
//! search and the ligand lookups run side by side and are joined before
//! the target is emitted. Targets are emitted, and collected, in completion
//! order.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use repurpose_common::events::{StructureEvent, StructureOutput};
use repurpose_common::{
    CandidateDrug, DockingTarget, EventSink, Ligand, ProteinTarget, Provenance, RepurposeError, Result,
};
use tracing::{debug, info, instrument, warn};

use crate::pdb::{pick_best, search_with_fallback, StructureSource};
use crate::pubchem::{resolve_name, CompoundSource};

const UNKNOWN_STATUS: &str = "Unknown";

pub struct StructureStage {
    structures: Arc<dyn StructureSource>,
    compounds: Arc<dyn CompoundSource>,
}

impl StructureStage {
    pub fn new(structures: Arc<dyn StructureSource>, compounds: Arc<dyn CompoundSource>) -> Self {
        Self { structures, compounds }
    }

    #[instrument(skip_all, fields(proteins = proteins.len(), drugs = drugs.len()))]
    pub async fn run(
        &self,
        proteins: &[String],
        drugs: &[CandidateDrug],
        sink: &EventSink<StructureEvent>,
    ) -> Result<StructureOutput> {
        let proteins: Vec<&str> = proteins
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if proteins.is_empty() {
            return Err(RepurposeError::InvalidInput("proteinTargets is required".into()));
        }
        let total = proteins.len();
        sink.emit(StructureEvent::Progress {
            message: format!("Processing {total} protein targets in parallel..."),
        });

        let mut pending: FuturesUnordered<_> = proteins
            .iter()
            .enumerate()
            .map(|(i, protein)| self.resolve_target(protein, i, total, drugs, sink))
            .collect();

        let mut docking_targets = Vec::with_capacity(total);
        while let Some(target) = pending.next().await {
            sink.emit(StructureEvent::Target {
                target: target.clone(),
                completed: docking_targets.len() + 1,
                total,
            });
            docking_targets.push(target);
        }

        info!(
            targets = docking_targets.len(),
            with_structure = docking_targets.iter().filter(|t| t.protein.has_structure()).count(),
            "Structure acquisition complete"
        );
        Ok(StructureOutput { docking_targets })
    }

    async fn resolve_target(
        &self,
        protein: &str,
        index: usize,
        total: usize,
        drugs: &[CandidateDrug],
        sink: &EventSink<StructureEvent>,
    ) -> DockingTarget {
        let (protein_target, ligands) = tokio::join!(
            self.resolve_structure(protein, index, total, sink),
            self.resolve_ligands(protein, drugs, sink),
        );
        let mut target = DockingTarget::new(protein_target, Vec::new());
        target.extend_unique(ligands);
        debug!(
            protein,
            ligands = target.ligands.len(),
            structure = target.protein.resolved_structure_id.as_deref().unwrap_or("none"),
            "Target resolved"
        );
        target
    }

    async fn resolve_structure(
        &self,
        protein: &str,
        index: usize,
        total: usize,
        sink: &EventSink<StructureEvent>,
    ) -> ProteinTarget {
        sink.emit(StructureEvent::Progress {
            message: format!("Searching PDB for {protein}... ({}/{total})", index + 1),
        });
        let target = ProteinTarget::new(protein);

        let hits = search_with_fallback(self.structures.as_ref(), protein).await;
        let Some(best) = pick_best(self.structures.as_ref(), &hits).await else {
            warn!(protein, "No structure found");
            return target;
        };

        let id = best.hit.id;
        sink.emit(StructureEvent::Progress {
            message: format!("Downloading PDB structure {id} for {protein}..."),
        });
        let blob = match self.structures.download(&id).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(protein, id = %id, error = %e, "Structure download failed");
                None
            }
        };
        target.with_structure(id, blob)
    }

    /// Drugs associated with `protein`, or every drug if none are.
    async fn resolve_ligands(
        &self,
        protein: &str,
        drugs: &[CandidateDrug],
        sink: &EventSink<StructureEvent>,
    ) -> Vec<Ligand> {
        let matched: Vec<&CandidateDrug> = drugs.iter().filter(|d| d.targets_protein(protein)).collect();
        let selected: Vec<&CandidateDrug> = if matched.is_empty() { drugs.iter().collect() } else { matched };
        if selected.is_empty() {
            return Vec::new();
        }
        sink.emit(StructureEvent::Progress {
            message: format!("Looking up SMILES for {} drugs targeting {protein}...", selected.len()),
        });

        let lookups = selected.iter().map(|drug| async move {
            let compound = resolve_name(self.compounds.as_ref(), &drug.name).await;
            (drug, compound)
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(drug, compound)| {
                let Some(compound) = compound else {
                    debug!(drug = %drug.name, protein, "No structure string, excluding drug");
                    return None;
                };
                Some(ligand_for(drug, compound.cid, compound.smiles))
            })
            .collect()
    }
}

fn ligand_for(drug: &CandidateDrug, cid: u64, smiles: String) -> Ligand {
    let status = drug.regulatory_status.trim();
    Ligand {
        name: drug.name.clone(),
        canonical_structure: smiles,
        mechanism: drug.mechanism.clone(),
        regulatory_status: if status.is_empty() { UNKNOWN_STATUS.to_string() } else { status.to_string() },
        provenance: Provenance::Literature { cid },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ligand_for_defaults_status() {
        let drug = CandidateDrug { name: "Gefitinib".into(), ..Default::default() };
        let ligand = ligand_for(&drug, 123631, "COC1=C".into());
        assert_eq!(ligand.regulatory_status, "Unknown");
        assert_eq!(ligand.provenance.to_string(), "pubchem_cid_123631");
    }
}
