//! Core entity types passed between pipeline stages.
//!
//! Wire names are camelCase to match the stage invocation contracts served
//! over HTTP. Every collection here is append-only from the controller's
//! point of view: stages return new values instead of mutating shared ones.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Expansion rounds allowed beyond the initial round.
pub const MAX_EXPANSION_ROUNDS: u32 = 2;

/// Targets used when discovery cannot extract any from the review.
pub const DEFAULT_PROTEIN_TARGETS: [&str; 3] = ["EGFR", "p53", "KRAS"];

// ---------------------------------------------------------------------------
// Protein target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinTarget {
    pub name: String,
    /// PDB identifier of the selected structure.
    #[serde(default, alias = "pdbId")]
    pub resolved_structure_id: Option<String>,
    /// Base64-encoded structure file.
    #[serde(default, alias = "pdbContentB64")]
    pub structure_blob: Option<String>,
}

impl ProteinTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), resolved_structure_id: None, structure_blob: None }
    }

    pub fn with_structure(mut self, id: impl Into<String>, blob: Option<String>) -> Self {
        self.resolved_structure_id = Some(id.into());
        self.structure_blob = blob;
        self
    }

    pub fn has_structure(&self) -> bool {
        self.structure_blob.as_deref().is_some_and(|b| !b.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// How a ligand entered the candidate pool.
///
/// Serialized as a tagged origin string, e.g. `pubchem_cid_2244`,
/// `pubchem_3dsim_cid_5090_from_2244` or `class:statins:pubchem_cid_54454`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Provenance {
    /// Named in the literature and resolved by name.
    Literature { cid: u64 },
    /// Returned by a 3-D similarity search seeded with `seed`.
    StructuralSimilarity { cid: u64, seed: u64 },
    /// Enumerated as a member of a drug class.
    DrugClass { class: String, cid: u64 },
    /// No structure could be resolved.
    Unresolved,
    /// Any origin string this build does not recognise.
    Other(String),
}

impl Provenance {
    /// Small-molecule database identifier, when the origin carries one.
    pub fn compound_id(&self) -> Option<u64> {
        match self {
            Provenance::Literature { cid }
            | Provenance::StructuralSimilarity { cid, .. }
            | Provenance::DrugClass { cid, .. } => Some(*cid),
            Provenance::Unresolved | Provenance::Other(_) => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Literature { cid } => write!(f, "pubchem_cid_{cid}"),
            Provenance::StructuralSimilarity { cid, seed } => {
                write!(f, "pubchem_3dsim_cid_{cid}_from_{seed}")
            }
            Provenance::DrugClass { class, cid } => write!(f, "class:{class}:pubchem_cid_{cid}"),
            Provenance::Unresolved => f.write_str("no_smiles"),
            Provenance::Other(s) => f.write_str(s),
        }
    }
}

impl From<Provenance> for String {
    fn from(p: Provenance) -> Self {
        p.to_string()
    }
}

impl From<String> for Provenance {
    fn from(s: String) -> Self {
        Provenance::parse(&s)
    }
}

impl Provenance {
    pub fn parse(s: &str) -> Self {
        if s == "no_smiles" {
            return Provenance::Unresolved;
        }
        if let Some(rest) = s.strip_prefix("pubchem_3dsim_cid_") {
            if let Some((cid, seed)) = rest.split_once("_from_") {
                if let (Ok(cid), Ok(seed)) = (cid.parse(), seed.parse()) {
                    return Provenance::StructuralSimilarity { cid, seed };
                }
            }
        }
        if let Some(cid) = s.strip_prefix("pubchem_cid_").and_then(|c| c.parse().ok()) {
            return Provenance::Literature { cid };
        }
        if let Some(rest) = s.strip_prefix("class:") {
            if let Some((class, cid)) = rest.rsplit_once(":pubchem_cid_") {
                if let Ok(cid) = cid.parse() {
                    return Provenance::DrugClass { class: class.to_string(), cid };
                }
            }
        }
        Provenance::Other(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Ligand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ligand {
    pub name: String,
    /// SMILES; the dedup key within one protein target.
    #[serde(alias = "smiles")]
    pub canonical_structure: String,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default, alias = "fdaStatus")]
    pub regulatory_status: String,
    #[serde(alias = "source")]
    pub provenance: Provenance,
}

impl Ligand {
    pub fn is_dockable(&self) -> bool {
        !self.canonical_structure.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Candidate drug (discovery output)
// ---------------------------------------------------------------------------

/// A drug named in the literature together with the proteins it may bind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateDrug {
    #[serde(alias = "drug")]
    pub name: String,
    pub proteins: Vec<String>,
    pub mechanism: String,
    #[serde(alias = "fda_status", alias = "fdaStatus")]
    pub regulatory_status: String,
    /// `mainstream` or `repurposing_candidate`, as reported by extraction.
    pub category: String,
}

impl CandidateDrug {
    /// Case-insensitive substring match in either direction against any associated protein.
    pub fn targets_protein(&self, protein: &str) -> bool {
        let wanted = protein.to_lowercase();
        self.proteins.iter().any(|p| {
            let p = p.to_lowercase();
            !p.is_empty() && (p.contains(&wanted) || wanted.contains(&p))
        })
    }
}

// ---------------------------------------------------------------------------
// Docking target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingTarget {
    pub protein: ProteinTarget,
    pub ligands: Vec<Ligand>,
}

impl DockingTarget {
    pub fn new(protein: ProteinTarget, ligands: Vec<Ligand>) -> Self {
        Self { protein, ligands }
    }

    pub fn known_structures(&self) -> HashSet<&str> {
        self.ligands.iter().map(|l| l.canonical_structure.as_str()).collect()
    }

    /// Filter `candidates` down to ligands whose structure is new for this
    /// protein, also dropping repeats within `candidates` itself.
    pub fn unseen(&self, candidates: impl IntoIterator<Item = Ligand>) -> Vec<Ligand> {
        let known = self.known_structures();
        let mut fresh: HashSet<String> = HashSet::new();
        candidates
            .into_iter()
            .filter(|l| {
                !known.contains(l.canonical_structure.as_str())
                    && fresh.insert(l.canonical_structure.clone())
            })
            .collect()
    }

    /// Append ligands not already present; returns how many were added.
    pub fn extend_unique(&mut self, candidates: impl IntoIterator<Item = Ligand>) -> usize {
        let fresh = self.unseen(candidates);
        let n = fresh.len();
        self.ligands.extend(fresh);
        n
    }
}

// ---------------------------------------------------------------------------
// Docking result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingResult {
    #[serde(alias = "name")]
    pub ligand_name: String,
    /// Always within [0, 1].
    pub confidence_score: f64,
    pub confidence_raw: f64,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default, alias = "fdaStatus")]
    pub regulatory_status: String,
    #[serde(alias = "source")]
    pub provenance: Provenance,
    pub protein_target: String,
    #[serde(default, alias = "pdbId")]
    pub structure_id: String,
    pub round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "allPoses")]
    pub poses: Option<Vec<serde_json::Value>>,
}

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionAction {
    #[serde(alias = "expand_3d_similar")]
    ExpandSimilarity,
    ExpandClass,
    Proceed,
}

impl ExpansionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpansionAction::ExpandSimilarity => "expand_similarity",
            ExpansionAction::ExpandClass => "expand_class",
            ExpansionAction::Proceed => "proceed",
        }
    }

    /// Parse an oracle-supplied label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "expand_similarity" | "expand_3d_similar" => Some(ExpansionAction::ExpandSimilarity),
            "expand_class" => Some(ExpansionAction::ExpandClass),
            "proceed" => Some(ExpansionAction::Proceed),
            _ => None,
        }
    }

    pub fn is_expansion(&self) -> bool {
        !matches!(self, ExpansionAction::Proceed)
    }
}

impl fmt::Display for ExpansionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningDecision {
    pub action: ExpansionAction,
    pub rationale: String,
    pub hypothesis: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "seedCids")]
    pub seed_identifiers: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_names: Option<Vec<String>>,
}

impl ReasoningDecision {
    pub fn proceed(rationale: impl Into<String>) -> Self {
        Self {
            action: ExpansionAction::Proceed,
            rationale: rationale.into(),
            hypothesis: String::new(),
            seed_identifiers: None,
            drug_class: None,
            drug_names: None,
        }
    }
}

/// One entry of the controller's expansion history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionRecord {
    pub round: u32,
    pub action: ExpansionAction,
    pub rationale: String,
    #[serde(default)]
    pub hypothesis: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ligand(name: &str, smiles: &str) -> Ligand {
        Ligand {
            name: name.to_string(),
            canonical_structure: smiles.to_string(),
            mechanism: String::new(),
            regulatory_status: String::new(),
            provenance: Provenance::Literature { cid: 1 },
        }
    }

    #[test]
    fn test_provenance_string_forms() {
        let cases = [
            Provenance::Literature { cid: 2244 },
            Provenance::StructuralSimilarity { cid: 5090, seed: 2244 },
            Provenance::DrugClass { class: "HMG-CoA reductase inhibitors".into(), cid: 54454 },
            Provenance::Unresolved,
        ];
        for p in cases {
            assert_eq!(Provenance::parse(&p.to_string()), p);
        }
        assert_eq!(
            Provenance::parse("chembl"),
            Provenance::Other("chembl".to_string())
        );
    }

    #[test]
    fn test_provenance_compound_id() {
        assert_eq!(Provenance::StructuralSimilarity { cid: 7, seed: 3 }.compound_id(), Some(7));
        assert_eq!(Provenance::Unresolved.compound_id(), None);
    }

    #[test]
    fn test_provenance_serializes_as_string() {
        let json = serde_json::to_string(&Provenance::Literature { cid: 42 }).unwrap();
        assert_eq!(json, "\"pubchem_cid_42\"");
    }

    #[test]
    fn test_candidate_drug_accepts_extraction_field_names() {
        let drug: CandidateDrug = serde_json::from_str(
            r#"{"drug":"Metformin","proteins":["AMPK"],"fda_status":"FDA approved (diabetes)"}"#,
        )
        .unwrap();
        assert_eq!(drug.name, "Metformin");
        assert_eq!(drug.regulatory_status, "FDA approved (diabetes)");
        assert!(drug.mechanism.is_empty());
    }

    #[test]
    fn test_targets_protein_fuzzy_both_directions() {
        let drug = CandidateDrug {
            name: "Erlotinib".into(),
            proteins: vec!["EGFR".into()],
            ..Default::default()
        };
        assert!(drug.targets_protein("egfr kinase domain"));
        let drug = CandidateDrug {
            proteins: vec!["Epidermal growth factor receptor (EGFR)".into()],
            ..Default::default()
        };
        assert!(drug.targets_protein("EGFR"));
        assert!(!drug.targets_protein("KRAS"));
    }

    #[test]
    fn test_extend_unique_dedups_against_existing_and_self() {
        let mut target = DockingTarget::new(ProteinTarget::new("KRAS"), vec![ligand("a", "CCO")]);
        let added = target.extend_unique(vec![
            ligand("b", "CCO"),
            ligand("c", "CCN"),
            ligand("d", "CCN"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(target.ligands.len(), 2);
        assert_eq!(target.ligands[1].name, "c");
        assert_eq!(target.known_structures(), HashSet::from(["CCO", "CCN"]));
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(ExpansionAction::from_label("expand_3d_similar"), Some(ExpansionAction::ExpandSimilarity));
        assert_eq!(ExpansionAction::from_label(" Proceed "), Some(ExpansionAction::Proceed));
        assert_eq!(ExpansionAction::from_label("expand_everything"), None);
        let a: ExpansionAction = serde_json::from_str("\"expand_3d_similar\"").unwrap();
        assert_eq!(a, ExpansionAction::ExpandSimilarity);
    }
}
