//! Expansion: turn an approved reasoning decision into new docking targets.
//!
//! Similarity expansion searches around seed compounds; class expansion
//! resolves members of a drug class. Either way the new ligands are fanned
//! out to every protein in scope, deduplicated by structure against what
//! each protein already has, and proteins with nothing new are dropped.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use repurpose_common::confidence::rank_descending;
use repurpose_common::json::{extract_value, parse_string_list};
use repurpose_common::{
    DockingResult, DockingTarget, ExpansionAction, Ligand, ProteinTarget, Provenance, ReasoningDecision,
    RepurposeError, Result,
};
use repurpose_llm::{ask, LlmBackend};
use repurpose_molecules::pubchem::{resolve_name, Compound, CompoundSource};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Seeds derived from prior results when the decision names none.
pub const MAX_DERIVED_SEEDS: usize = 5;
pub const SIMILAR_PER_SEED: usize = 10;
/// Drugs requested when a class must be enumerated.
pub const CLASS_ENUMERATION_SIZE: usize = 10;

const SIMILAR_STATUS: &str = "Unknown — requires verification";
const CLASS_STATUS: &str = "FDA-approved — requires indication verification";

const ENUMERATE_SYSTEM: &str = "You are a pharmacology expert. Reply with ONLY a JSON array of drug names.";

pub struct ExpansionRequest<'a> {
    pub decision: &'a ReasoningDecision,
    pub proteins: &'a [String],
    pub existing: &'a [DockingTarget],
    pub results: &'a [DockingResult],
}

pub struct Expander {
    llm: Arc<dyn LlmBackend>,
    compounds: Arc<dyn CompoundSource>,
}

impl Expander {
    pub fn new(llm: Arc<dyn LlmBackend>, compounds: Arc<dyn CompoundSource>) -> Self {
        Self { llm, compounds }
    }

    /// New docking targets carrying only ligands unseen for their protein.
    #[instrument(skip_all, fields(action = %req.decision.action))]
    pub async fn expand(&self, req: ExpansionRequest<'_>) -> Result<Vec<DockingTarget>> {
        let proteins = distinct_proteins(req.proteins);
        if proteins.is_empty() {
            return Err(RepurposeError::InvalidInput("proteinTargets is required".into()));
        }

        let ligands = match req.decision.action {
            ExpansionAction::ExpandSimilarity => {
                let seeds = seed_ids(req.decision, req.results);
                self.similar_ligands(&seeds).await
            }
            ExpansionAction::ExpandClass => self.class_ligands(req.decision, &proteins).await,
            ExpansionAction::Proceed => return Ok(Vec::new()),
        };

        let targets = fan_out(&ligands, &proteins, req.existing);
        info!(
            candidates = ligands.len(),
            targets = targets.len(),
            new_ligands = targets.iter().map(|t| t.ligands.len()).sum::<usize>(),
            "Expansion complete"
        );
        Ok(targets)
    }

    async fn similar_ligands(&self, seeds: &[u64]) -> Vec<Ligand> {
        if seeds.is_empty() {
            warn!("Similarity expansion has no seed compounds");
            return Vec::new();
        }
        let searches = seeds.iter().map(|&seed| async move {
            match self.compounds.similar_3d(seed, SIMILAR_PER_SEED).await {
                Ok(found) => found.into_iter().map(|c| similarity_ligand(c, seed)).collect(),
                Err(e) => {
                    warn!(seed, error = %e, "Similarity search failed");
                    Vec::new()
                }
            }
        });
        join_all(searches).await.into_iter().flatten().collect()
    }

    async fn class_ligands(&self, decision: &ReasoningDecision, proteins: &[String]) -> Vec<Ligand> {
        let class = decision
            .drug_class
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let mut names = decision.drug_names.clone().unwrap_or_default();
        if names.is_empty() {
            match class {
                Some(class) => names = self.enumerate_class(class, proteins).await,
                None => {
                    warn!("Class expansion has neither drug names nor a class");
                    return Vec::new();
                }
            }
        }
        let class = class.unwrap_or("unknown");

        let lookups = names.iter().map(|name| async move {
            (name, resolve_name(self.compounds.as_ref(), name).await)
        });
        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(name, compound)| {
                let compound = compound?;
                Some(class_ligand(name, class, compound))
            })
            .collect()
    }

    async fn enumerate_class(&self, class: &str, proteins: &[String]) -> Vec<String> {
        let user = format!(
            "List {CLASS_ENUMERATION_SIZE} FDA-approved drugs in the class \"{class}\" that might bind \
             these proteins: {}. Return ONLY a JSON array of drug name strings.",
            proteins.join(", ")
        );
        match ask(self.llm.as_ref(), ENUMERATE_SYSTEM, &user).await {
            Ok(raw) => {
                let names = names_from_reply(&raw);
                debug!(class, count = names.len(), "Enumerated drug class");
                names
            }
            Err(e) => {
                warn!(class, error = %e, "Drug class enumeration failed");
                Vec::new()
            }
        }
    }
}

fn distinct_proteins(proteins: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    proteins
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

/// Explicit seeds, or up to [`MAX_DERIVED_SEEDS`] compound ids taken from
/// the best-scoring results that carry one.
pub fn seed_ids(decision: &ReasoningDecision, results: &[DockingResult]) -> Vec<u64> {
    if let Some(seeds) = decision.seed_identifiers.as_ref().filter(|s| !s.is_empty()) {
        return seeds.clone();
    }
    let mut ranked = results.to_vec();
    rank_descending(&mut ranked);
    let mut seen = HashSet::new();
    ranked
        .iter()
        .filter_map(|r| r.provenance.compound_id())
        .filter(|cid| seen.insert(*cid))
        .take(MAX_DERIVED_SEEDS)
        .collect()
}

/// `[..]`, `{"drugs": [..]}`, or a comma-separated list.
fn names_from_reply(raw: &str) -> Vec<String> {
    let from_json = match extract_value(raw) {
        Ok(Value::Array(items)) => Some(items),
        Ok(Value::Object(map)) => map.get("drugs").and_then(Value::as_array).cloned(),
        _ => None,
    };
    match from_json {
        Some(items) => items
            .iter()
            .filter_map(|v| v.as_str().or_else(|| v.get("name").and_then(Value::as_str)))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => parse_string_list(raw),
    }
}

fn similarity_ligand(compound: Compound, seed: u64) -> Ligand {
    let name = if compound.iupac_name.trim().is_empty() {
        format!("CID_{}", compound.cid)
    } else {
        compound.iupac_name
    };
    Ligand {
        name,
        canonical_structure: compound.smiles,
        mechanism: format!("3D-similar to CID {seed}"),
        regulatory_status: SIMILAR_STATUS.to_string(),
        provenance: Provenance::StructuralSimilarity { cid: compound.cid, seed },
    }
}

fn class_ligand(name: &str, class: &str, compound: Compound) -> Ligand {
    Ligand {
        name: name.to_string(),
        canonical_structure: compound.smiles,
        mechanism: format!("Class expansion: {class}"),
        regulatory_status: CLASS_STATUS.to_string(),
        provenance: Provenance::DrugClass { class: class.to_string(), cid: compound.cid },
    }
}

/// One target per protein with at least one ligand it has not seen.
/// Existing targets contribute their structure; unknown proteins get none.
pub fn fan_out(ligands: &[Ligand], proteins: &[String], existing: &[DockingTarget]) -> Vec<DockingTarget> {
    let dockable: Vec<&Ligand> = ligands.iter().filter(|l| l.is_dockable()).collect();
    if dockable.is_empty() {
        return Vec::new();
    }
    proteins
        .iter()
        .filter_map(|protein| {
            let current = existing
                .iter()
                .find(|t| t.protein.name == *protein)
                .cloned()
                .unwrap_or_else(|| DockingTarget::new(ProteinTarget::new(protein.as_str()), Vec::new()));
            let fresh = current.unseen(dockable.iter().map(|l| (*l).clone()));
            if fresh.is_empty() {
                debug!(protein = %protein, "No new ligands after dedup");
                return None;
            }
            Some(DockingTarget::new(current.protein, fresh))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ligand(name: &str, smiles: &str) -> Ligand {
        Ligand {
            name: name.into(),
            canonical_structure: smiles.into(),
            mechanism: String::new(),
            regulatory_status: String::new(),
            provenance: Provenance::Literature { cid: 1 },
        }
    }

    fn result(score: f64, provenance: Provenance) -> DockingResult {
        DockingResult {
            ligand_name: "x".into(),
            confidence_score: score,
            confidence_raw: 0.0,
            mechanism: String::new(),
            regulatory_status: String::new(),
            provenance,
            protein_target: "EGFR".into(),
            structure_id: String::new(),
            round: 1,
            poses: None,
        }
    }

    #[test]
    fn test_derived_seeds_best_first_with_ids_only() {
        let results = vec![
            result(0.2, Provenance::Literature { cid: 10 }),
            result(0.9, Provenance::Unresolved),
            result(0.8, Provenance::StructuralSimilarity { cid: 20, seed: 10 }),
            result(0.7, Provenance::Literature { cid: 20 }),
            result(0.5, Provenance::DrugClass { class: "statins".into(), cid: 30 }),
        ];
        let decision = ReasoningDecision::proceed("");
        assert_eq!(seed_ids(&decision, &results), vec![20, 30, 10]);

        let explicit = ReasoningDecision { seed_identifiers: Some(vec![99]), ..decision };
        assert_eq!(seed_ids(&explicit, &results), vec![99]);
    }

    #[test]
    fn test_fan_out_dedups_per_protein() {
        let existing = vec![
            DockingTarget::new(
                ProteinTarget::new("EGFR").with_structure("1M17", Some("blob".into())),
                vec![ligand("Erlotinib", "C1")],
            ),
            DockingTarget::new(ProteinTarget::new("KRAS"), vec![ligand("Erlotinib", "C1"), ligand("New", "C2")]),
        ];
        let candidates = vec![ligand("Erlotinib again", "C1"), ligand("New", "C2"), ligand("New dup", "C2")];
        let proteins = vec!["EGFR".to_string(), "KRAS".to_string(), "BRAF".to_string()];

        let targets = fan_out(&candidates, &proteins, &existing);

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].protein.name, "EGFR");
        assert_eq!(targets[0].protein.resolved_structure_id.as_deref(), Some("1M17"));
        assert_eq!(targets[0].ligands.len(), 1);
        assert_eq!(targets[0].ligands[0].name, "New");
        assert_eq!(targets[1].protein.name, "BRAF");
        assert!(!targets[1].protein.has_structure());
    }

    #[test]
    fn test_names_from_reply_shapes() {
        assert_eq!(names_from_reply(r#"["Atorvastatin", "Simvastatin"]"#), ["Atorvastatin", "Simvastatin"]);
        assert_eq!(names_from_reply(r#"{"drugs": ["Lovastatin"]}"#), ["Lovastatin"]);
        assert_eq!(names_from_reply("Pravastatin, Rosuvastatin"), ["Pravastatin", "Rosuvastatin"]);
    }

    #[test]
    fn test_similarity_ligand_naming() {
        let unnamed = Compound { cid: 5, smiles: "C".into(), iupac_name: String::new(), molecular_formula: String::new() };
        let lig = similarity_ligand(unnamed, 2244);
        assert_eq!(lig.name, "CID_5");
        assert_eq!(lig.mechanism, "3D-similar to CID 2244");
        assert_eq!(lig.provenance.to_string(), "pubchem_3dsim_cid_5_from_2244");
    }
}
