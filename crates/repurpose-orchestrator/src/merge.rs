//! Collapse docking results for the same drug across targets.
//!
//! Rows are keyed by case-insensitive name. A merged row keeps the best
//! score for every protein it was docked against, plus the overall best
//! and the protein it came from, so callers can show either view.

use std::collections::HashMap;

use repurpose_common::{DockingResult, Provenance};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetScore {
    pub protein: String,
    pub best_score: f64,
    pub structure_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDrug {
    /// Name as first seen.
    pub name: String,
    pub mechanism: String,
    pub regulatory_status: String,
    pub provenance: Provenance,
    /// First-seen target order.
    pub targets: Vec<TargetScore>,
    pub best_score: f64,
    pub best_protein: String,
    /// Earliest round the drug was docked in.
    pub first_round: u32,
}

impl MergedDrug {
    fn from_result(r: &DockingResult) -> Self {
        Self {
            name: r.ligand_name.clone(),
            mechanism: r.mechanism.clone(),
            regulatory_status: r.regulatory_status.clone(),
            provenance: r.provenance.clone(),
            targets: Vec::new(),
            best_score: r.confidence_score,
            best_protein: r.protein_target.clone(),
            first_round: r.round,
        }
    }

    fn absorb(&mut self, r: &DockingResult) {
        match self.targets.iter_mut().find(|t| t.protein == r.protein_target) {
            Some(t) if r.confidence_score > t.best_score => {
                t.best_score = r.confidence_score;
                t.structure_id = r.structure_id.clone();
            }
            Some(_) => {}
            None => self.targets.push(TargetScore {
                protein: r.protein_target.clone(),
                best_score: r.confidence_score,
                structure_id: r.structure_id.clone(),
            }),
        }
        if r.confidence_score > self.best_score {
            self.best_score = r.confidence_score;
            self.best_protein = r.protein_target.clone();
        }
        self.first_round = self.first_round.min(r.round);
    }

    pub fn score_for(&self, protein: &str) -> Option<f64> {
        self.targets.iter().find(|t| t.protein == protein).map(|t| t.best_score)
    }
}

/// One row per distinct drug, best overall score first. Ties keep the order
/// in which the drugs first appear.
pub fn merge_duplicates(results: &[DockingResult]) -> Vec<MergedDrug> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<MergedDrug> = Vec::new();
    for r in results {
        let key = r.ligand_name.trim().to_lowercase();
        let slot = *index.entry(key).or_insert_with(|| {
            merged.push(MergedDrug::from_result(r));
            merged.len() - 1
        });
        merged[slot].absorb(r);
    }
    merged.sort_by(|a, b| b.best_score.total_cmp(&a.best_score));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, protein: &str, score: f64, round: u32) -> DockingResult {
        DockingResult {
            ligand_name: name.into(),
            confidence_score: score,
            confidence_raw: 0.0,
            mechanism: String::new(),
            regulatory_status: String::new(),
            provenance: Provenance::Literature { cid: 1 },
            protein_target: protein.into(),
            structure_id: format!("{protein}-pdb"),
            round,
            poses: None,
        }
    }

    #[test]
    fn test_merge_keeps_per_target_and_overall_best() {
        let results = vec![
            result("Metformin", "EGFR", 0.40, 1),
            result("metformin", "KRAS", 0.75, 2),
            result("METFORMIN ", "EGFR", 0.55, 3),
            result("Erlotinib", "EGFR", 0.60, 1),
        ];

        let merged = merge_duplicates(&results);

        assert_eq!(merged.len(), 2);
        let metformin = &merged[0];
        assert_eq!(metformin.name, "Metformin");
        assert_eq!(metformin.best_score, 0.75);
        assert_eq!(metformin.best_protein, "KRAS");
        assert_eq!(metformin.score_for("EGFR"), Some(0.55));
        assert_eq!(metformin.score_for("KRAS"), Some(0.75));
        assert_eq!(metformin.targets[0].protein, "EGFR");
        assert_eq!(metformin.first_round, 1);
        assert_eq!(merged[1].name, "Erlotinib");
    }

    #[test]
    fn test_merge_ties_keep_first_appearance() {
        let results = vec![result("B", "EGFR", 0.5, 1), result("A", "EGFR", 0.5, 1)];
        let names: Vec<_> = merge_duplicates(&results).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
