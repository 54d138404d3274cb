//! Literature & target discovery stage.
//!
//! Flow for one condition:
//!   1. Search the literature source for background papers
//!   2. Generate a scholarly review from them
//!   3. Extract protein targets from the review (default list if none)
//!   4. Search again, biased toward the targets and repurposing terms
//!   5. Generate a drug/target narrative and a cross-indication repurposing narrative
//!   6. Extract a structured drug → protein → mechanism → status table
//!
//! Progress is emitted after each step. Literature search failures degrade
//! to "no papers"; extraction failures degrade to defaults. A failed
//! generation call fails the stage.

use std::sync::Arc;

use repurpose_common::error::require_non_empty;
use repurpose_common::events::{DiscoveryEvent, DiscoveryOutput};
use repurpose_common::json::parse_string_list;
use repurpose_common::{CandidateDrug, EventSink, Result, DEFAULT_PROTEIN_TARGETS};
use repurpose_llm::{ask, parse_with_repair, LlmBackend};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::dedup::{dedup_in_place, merge_unique};
use crate::models::{format_for_prompt, Paper};
use crate::sources::LiteratureSource;

pub const DEFAULT_MAX_PAPERS: usize = 15;

const NO_PAPERS: &str = "(No papers found.)";

// ── Prompts ───────────────────────────────────────────────────────────────────

const REVIEW_SYSTEM: &str = "You are an expert oncology and translational-medicine researcher. \
Write a detailed, scholarly literature review in Markdown. Cite the supplied papers inline as [1], [2], …";

const TARGETS_SYSTEM: &str = "You are a biomedical research assistant. Extract the protein \
targets discussed in the text. Reply with ONLY a JSON array of short protein names or gene \
symbols, for example [\"EGFR\", \"HER2\", \"BRAF\"]. No explanation.";

const DRUGS_SYSTEM: &str = "You are an expert pharmacology researcher. Write a detailed Markdown \
section on approved drugs and candidate compounds. Be precise about drug names, mechanisms and \
protein interactions.";

const REPURPOSING_SYSTEM: &str = "You are a computational pharmacology expert in drug repurposing \
and polypharmacology. Write a detailed Markdown section for a literature review, drawing on every \
therapeutic area (cardiology, psychiatry, infectious disease, metabolic and autoimmune disease, \
and beyond). Cite sources where possible.";

const EXTRACT_SYSTEM: &str = "You are a biomedical data-extraction assistant. Reply with ONLY valid \
JSON, no prose and no Markdown fences. The JSON is an object with a top-level key \"drugs\" whose \
value is an array of objects with keys \"drug\" (string), \"proteins\" (array of target protein \
symbols), \"mechanism\" (string), \"fda_status\" (string) and \"category\" (\"mainstream\" or \
\"repurposing_candidate\").";

fn review_prompt(condition: &str, papers: &str) -> String {
    format!(
        "Using the papers below, write a comprehensive literature review about **{condition}**.\n\n\
         Cover:\n\
         1. Introduction (epidemiology, clinical significance)\n\
         2. Molecular and genetic landscape\n\
         3. **Key protein targets** for treatment\n\
         4. Current therapeutic strategies\n\
         5. References\n\n\
         Papers:\n{papers}"
    )
}

fn drugs_prompt(condition: &str, proteins: &[String], papers: &str) -> String {
    format!(
        "Continue the review on **{condition}**.\n\n\
         Protein targets: {}.\n\n\
         Write sections on:\n\
         1. Approved drugs and candidate compounds for each target\n\
         2. A drug–protein interaction summary table\n\
         3. Conclusion and future directions\n\n\
         Papers:\n{papers}",
        proteins.join(", ")
    )
}

fn repurposing_prompt(condition: &str, proteins: &[String]) -> String {
    format!(
        "These proteins are therapeutic targets in **{condition}**: {}.\n\n\
         Search across ALL approved drugs, not only oncology drugs, for known or computationally \
         predicted interactions with these proteins. Consider docking studies, binding-site \
         homology with known inhibitors, off-target activity from pharmacovigilance data, \
         structural similarity to known ligands, drug–gene interaction databases and virtual \
         screening hits.\n\n\
         Write Markdown sections covering at least 10 drugs.",
        proteins.join(", ")
    )
}

fn extract_prompt(condition: &str, proteins: &[String], text: &str) -> String {
    format!(
        "From the review sections below about {condition}, extract EVERY drug mentioned, both \
         mainstream treatments and repurposing candidates, together with which of these proteins \
         each may bind or act on: {}.\n\n\
         Mark drugs in routine use for this condition as \"mainstream\"; mark drugs from other \
         therapeutic areas or speculative candidates as \"repurposing_candidate\".\n\n\
         Text:\n{text}",
        proteins.join(", ")
    )
}

// ── Stage ─────────────────────────────────────────────────────────────────────

pub struct DiscoveryStage {
    llm: Arc<dyn LlmBackend>,
    literature: Arc<dyn LiteratureSource>,
    max_papers: usize,
}

impl DiscoveryStage {
    pub fn new(llm: Arc<dyn LlmBackend>, literature: Arc<dyn LiteratureSource>) -> Self {
        Self { llm, literature, max_papers: DEFAULT_MAX_PAPERS }
    }

    pub fn with_max_papers(mut self, max_papers: usize) -> Self {
        self.max_papers = max_papers;
        self
    }

    /// Run discovery for `condition`. Terminal events are left to the caller.
    #[instrument(skip(self, sink))]
    pub async fn run(
        &self,
        condition: &str,
        sink: &EventSink<DiscoveryEvent>,
    ) -> Result<DiscoveryOutput> {
        require_non_empty("conditionName", condition)?;
        let condition = condition.trim();
        let progress = |message: String| sink.emit(DiscoveryEvent::Progress { message });

        // ── 1. Background papers ──────────────────────────────────────────────
        progress(format!("Searching {} for relevant papers...", self.literature.name()));
        let mut background = self
            .search_or_empty(&self.literature.background_query(condition))
            .await;
        dedup_in_place(&mut background);
        progress(format!("Found {} papers", background.len()));

        // ── 2. Review ─────────────────────────────────────────────────────────
        progress("Generating literature review...".to_string());
        let background_text = papers_text(&background);
        let first_review = ask(
            self.llm.as_ref(),
            REVIEW_SYSTEM,
            &review_prompt(condition, &background_text),
        )
        .await?;

        // ── 3. Targets ────────────────────────────────────────────────────────
        progress("Extracting protein targets...".to_string());
        let proteins = self.extract_proteins(&first_review).await;
        sink.emit(DiscoveryEvent::Proteins { proteins: proteins.clone() });

        // ── 4. Target-biased papers ───────────────────────────────────────────
        progress("Searching for drug interaction papers...".to_string());
        let drug_query = self.literature.drug_query(condition, &proteins);
        let repurposing_query = self.literature.repurposing_query(&proteins);
        let (drug_papers, repurposing_papers) = tokio::join!(
            self.search_or_empty(&drug_query),
            self.search_or_empty(&repurposing_query),
        );
        let mut drug_set = Vec::new();
        merge_unique(&mut drug_set, drug_papers, &background);
        merge_unique(&mut drug_set, repurposing_papers, &background);
        progress(format!("Found {} drug-related papers", drug_set.len()));

        // ── 5. Narratives ─────────────────────────────────────────────────────
        progress("Analyzing approved drugs and candidates...".to_string());
        let drug_review = ask(
            self.llm.as_ref(),
            DRUGS_SYSTEM,
            &drugs_prompt(condition, &proteins, &papers_text(&drug_set)),
        )
        .await?;

        progress("Discovering repurposing candidates across therapeutic areas...".to_string());
        let repurposing_review = ask(
            self.llm.as_ref(),
            REPURPOSING_SYSTEM,
            &repurposing_prompt(condition, &proteins),
        )
        .await?;

        let review_document = assemble_review(condition, &first_review, &drug_review, &repurposing_review);
        let paper_count = background.len() + drug_set.len();
        sink.emit(DiscoveryEvent::Review { review: review_document.clone(), paper_count });

        // ── 6. Drug table ─────────────────────────────────────────────────────
        progress("Extracting drug-protein interaction map...".to_string());
        let combined = format!("{drug_review}\n\n{repurposing_review}");
        let candidate_drugs = self.extract_drugs(condition, &proteins, &combined).await;
        sink.emit(DiscoveryEvent::Drugs { drugs: candidate_drugs.clone() });

        info!(
            condition,
            proteins = proteins.len(),
            drugs = candidate_drugs.len(),
            paper_count,
            "Discovery complete"
        );

        Ok(DiscoveryOutput {
            protein_targets: proteins,
            review_document,
            candidate_drugs,
            paper_count,
        })
    }

    async fn search_or_empty(&self, query: &str) -> Vec<Paper> {
        match self.literature.search(query, self.max_papers).await {
            Ok(papers) => papers,
            Err(e) => {
                warn!(source = self.literature.name(), query, error = %e, "Literature search failed, continuing without papers");
                Vec::new()
            }
        }
    }

    async fn extract_proteins(&self, review: &str) -> Vec<String> {
        let proteins = match ask(self.llm.as_ref(), TARGETS_SYSTEM, review).await {
            Ok(raw) => parse_string_list(&raw),
            Err(e) => {
                warn!(error = %e, "Protein extraction failed");
                Vec::new()
            }
        };
        if proteins.is_empty() {
            warn!("No protein targets extracted, using default targets");
            return DEFAULT_PROTEIN_TARGETS.iter().map(|s| s.to_string()).collect();
        }
        proteins
    }

    async fn extract_drugs(&self, condition: &str, proteins: &[String], text: &str) -> Vec<CandidateDrug> {
        let raw = match ask(self.llm.as_ref(), EXTRACT_SYSTEM, &extract_prompt(condition, proteins, text)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Drug extraction failed, continuing with no drugs");
                return Vec::new();
            }
        };
        match parse_with_repair::<Value>(self.llm.as_ref(), &raw).await {
            Ok((value, outcome)) => {
                let drugs = drugs_from_value(&value);
                info!(count = drugs.len(), ?outcome, "Drug table extracted");
                drugs
            }
            Err(e) => {
                warn!(error = %e, "Drug table unusable after repair, continuing with no drugs");
                Vec::new()
            }
        }
    }
}

fn papers_text(papers: &[Paper]) -> String {
    if papers.is_empty() {
        NO_PAPERS.to_string()
    } else {
        format_for_prompt(papers)
    }
}

pub fn assemble_review(condition: &str, first: &str, drugs: &str, repurposing: &str) -> String {
    format!(
        "# Literature Review: {condition}\n\n---\n\n{first}\n\n---\n\n{drugs}\n\n---\n\n{repurposing}\n\n"
    )
}

/// Accept `{"drugs": [...]}` or a bare array; keep every entry with a name.
fn drugs_from_value(value: &Value) -> Vec<CandidateDrug> {
    let entries = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map.get("drugs").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]),
        _ => &[],
    };
    entries.iter().filter_map(candidate_from_value).collect()
}

fn str_field(v: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .unwrap_or("")
        .trim()
        .to_string()
}

fn candidate_from_value(v: &Value) -> Option<CandidateDrug> {
    let name = str_field(v, &["drug", "name"]);
    if name.is_empty() {
        return None;
    }
    let proteins = match v.get("proteins") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    Some(CandidateDrug {
        name,
        proteins,
        mechanism: str_field(v, &["mechanism"]),
        regulatory_status: str_field(v, &["fda_status", "fdaStatus", "regulatoryStatus"]),
        category: str_field(v, &["category"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drugs_from_object_and_array() {
        let v = serde_json::json!({"drugs": [
            {"drug": "Erlotinib", "proteins": ["EGFR"], "fda_status": "Approved (NSCLC)", "category": "mainstream"},
            {"drug": "", "proteins": []},
            {"name": "Metformin", "proteins": "AMPK, mTOR", "fdaStatus": "Approved (T2D)"}
        ]});
        let drugs = drugs_from_value(&v);
        assert_eq!(drugs.len(), 2);
        assert_eq!(drugs[0].regulatory_status, "Approved (NSCLC)");
        assert_eq!(drugs[1].proteins, ["AMPK", "mTOR"]);

        let v = serde_json::json!([{"drug": "Imatinib"}]);
        assert_eq!(drugs_from_value(&v)[0].name, "Imatinib");
        assert!(drugs_from_value(&serde_json::json!({"other": 1})).is_empty());
    }

    #[test]
    fn test_assemble_review_layout() {
        let md = assemble_review("PDAC", "A", "B", "C");
        assert_eq!(md, "# Literature Review: PDAC\n\n---\n\nA\n\n---\n\nB\n\n---\n\nC\n\n");
    }
}
