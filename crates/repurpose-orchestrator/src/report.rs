//! Report assembly: a locally built docking overview, generated prose
//! sections around it, and the final merge with the literature review.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use repurpose_common::confidence::rank_descending;
use repurpose_common::error::require_non_empty;
use repurpose_common::{DockingResult, DockingTarget, RepurposeError, Result};
use repurpose_llm::{ask, LlmBackend, LlmError};
use tracing::{info, instrument, warn};

use crate::analyze::truncate_chars;
use crate::classification::ClassCounts;

pub const OVERVIEW_ROWS_PER_TARGET: usize = 15;
const OVERVIEW_MECHANISM_CHARS: usize = 60;

const ABSTRACT_EXCERPT: usize = 3000;
const INTRODUCTION_EXCERPT: usize = 5000;
const CONCLUSION_EXCERPT: usize = 2000;

const WRITER: &str = "You are a scientific writer.";

/// Markdown overview of every target's best results. Built locally so the
/// generated sections all describe the same numbers.
pub fn overview_table(condition: &str, results: &[DockingResult], targets: &[DockingTarget]) -> String {
    let mut by_protein: HashMap<&str, Vec<DockingResult>> = HashMap::new();
    for r in results {
        let key = if r.protein_target.is_empty() { "unknown" } else { r.protein_target.as_str() };
        by_protein.entry(key).or_default().push(r.clone());
    }
    for rows in by_protein.values_mut() {
        rank_descending(rows);
    }

    let proteins: Vec<&str> = targets.iter().map(|t| t.protein.name.as_str()).collect();
    let mut out = String::from("## Docking Overview\n\n");
    let _ = writeln!(out, "- Condition: {condition}");
    let _ = writeln!(out, "- Total compounds docked: {}", results.len());
    let _ = writeln!(out, "- Protein targets: {}\n", proteins.join(", "));

    for target in targets {
        let structure = target.protein.resolved_structure_id.as_deref().unwrap_or("N/A");
        let _ = writeln!(out, "### {} (PDB: {structure})\n", target.protein.name);
        out.push_str("| Rank | Drug | Score | Status | Mechanism |\n");
        out.push_str("|------|------|-------|--------|-----------|\n");
        let rows = by_protein.get(target.protein.name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        for (i, r) in rows.iter().take(OVERVIEW_ROWS_PER_TARGET).enumerate() {
            let _ = writeln!(
                out,
                "| {} | {} | {:.4} | {} | {} |",
                i + 1,
                r.ligand_name,
                r.confidence_score,
                r.regulatory_status,
                truncate_chars(&r.mechanism, OVERVIEW_MECHANISM_CHARS)
            );
        }
        out.push('\n');
    }
    out
}

fn placeholder(section: &str) -> String {
    format!("_The {section} section could not be generated._")
}

/// Keep a generated section, or stand in a placeholder and log the failure.
fn section_or_placeholder(section: &str, generated: std::result::Result<String, LlmError>) -> (String, bool) {
    match generated {
        Ok(text) => (text, true),
        Err(e) => {
            warn!(section, error = %e, "Report section failed");
            (placeholder(section), false)
        }
    }
}

pub struct ReportWriter {
    llm: Arc<dyn LlmBackend>,
}

impl ReportWriter {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    async fn write(&self, system: String, user: String) -> std::result::Result<String, LlmError> {
        ask(self.llm.as_ref(), &system, &user).await
    }

    /// Methodology, results and conclusion, generated concurrently and
    /// concatenated in that order.
    #[instrument(skip_all, fields(condition = %condition, results = results.len()))]
    pub async fn write_report(
        &self,
        condition: &str,
        results: &[DockingResult],
        targets: &[DockingTarget],
    ) -> Result<String> {
        require_non_empty("conditionName", condition)?;
        if results.is_empty() {
            return Err(RepurposeError::InvalidInput("allResults is required".into()));
        }

        let overview = overview_table(condition, results, targets);
        let counts = ClassCounts::tally(results, condition);

        let methodology = self.write(
            format!("{WRITER} Write a detailed methodology section in Markdown."),
            format!(
                "Write a detailed methodology section for a drug repurposing paper about {condition}. \
                 The study used:\n\
                 - Diffusion-based molecular docking on serverless GPU workers\n\
                 - 10 poses per ligand-protein pair\n\
                 - Protein structures from RCSB PDB\n\
                 - Ligands from PubChem, literature review and iterative expansion\n\
                 - A language model for literature analysis and reasoning between rounds\n\n\
                 Overview:\n{overview}"
            ),
        );
        let results_section = self.write(
            format!("{WRITER} Write a detailed results section in Markdown with tables."),
            format!(
                "Write a detailed results section for a drug repurposing paper about {condition}.\n\n\
                 Docking results:\n{overview}\n\n\
                 Classification:\n{counts}\n\n\
                 Focus on:\n\
                 1. Overview of docking runs\n\
                 2. Drug repurposing leaderboard (approved drugs not indicated for this condition)\n\
                 3. Novel/research compounds\n\
                 4. Cross-target comparison\n\
                 5. Score distribution analysis"
            ),
        );
        let conclusion = self.write(
            format!("{WRITER} Write a conclusion section in Markdown."),
            format!(
                "Write a conclusion for a drug repurposing paper about {condition}.\n\n\
                 Results:\n{overview}\n\n\
                 Classification:\n{counts}\n\n\
                 Cover: key findings, top repurposing candidates, clinical implications, limitations, \
                 future directions."
            ),
        );
        let (methodology, results_section, conclusion) = tokio::join!(methodology, results_section, conclusion);

        let (methodology, ok_m) = section_or_placeholder("methodology", methodology);
        let (results_section, ok_r) = section_or_placeholder("results", results_section);
        let (conclusion, ok_c) = section_or_placeholder("conclusion", conclusion);
        if !(ok_m || ok_r || ok_c) {
            return Err(RepurposeError::Stage("every report section failed to generate".into()));
        }

        info!(total = counts.total(), "Report assembled");
        Ok(format!(
            "# Results: Drug Repurposing Analysis for {condition}\n\n\
             ## Methodology\n\n{methodology}\n\n\
             ## Results\n\n{results_section}\n\n\
             ## Conclusion\n\n{conclusion}\n"
        ))
    }

    /// Merge the literature review and the report into one paper.
    #[instrument(skip_all)]
    pub async fn write_paper(&self, review: &str, report: &str) -> Result<String> {
        require_non_empty("reviewDocument", review)?;
        require_non_empty("reportDocument", report)?;

        let abstract_text = self.write(
            format!("{WRITER} Write a concise abstract (200-300 words, single paragraph) for an academic paper."),
            format!(
                "Write an abstract combining these two sections:\n\n\
                 LITERATURE REVIEW:\n{}\n\n\
                 RESULTS:\n{}\n\n\
                 Cover: clinical problem, computational approach, key targets, top candidates, conclusions.",
                truncate_chars(review, ABSTRACT_EXCERPT),
                truncate_chars(report, ABSTRACT_EXCERPT),
            ),
        );
        let introduction = self.write(
            format!("{WRITER} Polish and merge these sections into a cohesive introduction. Preserve all citations."),
            format!(
                "Merge into a unified Introduction & Background section:\n\n{}",
                truncate_chars(review, INTRODUCTION_EXCERPT)
            ),
        );
        let results_section = self.write(
            format!("{WRITER} Polish this results section. Keep ALL tables and numerical data. Preserve citations."),
            format!("Polish this results section:\n\n{report}"),
        );
        let conclusion = self.write(
            format!(
                "{WRITER} Write a unified conclusion combining findings from both the literature review \
                 and computational results."
            ),
            format!(
                "Write a conclusion for this paper:\n\nREVIEW:\n{}\n\nRESULTS:\n{}",
                truncate_chars(review, CONCLUSION_EXCERPT),
                truncate_chars(report, CONCLUSION_EXCERPT),
            ),
        );
        let (abstract_text, introduction, results_section, conclusion) =
            tokio::join!(abstract_text, introduction, results_section, conclusion);

        let (abstract_text, ok_a) = section_or_placeholder("abstract", abstract_text);
        let (introduction, ok_i) = section_or_placeholder("introduction", introduction);
        let (results_section, ok_r) = section_or_placeholder("results", results_section);
        let (conclusion, ok_c) = section_or_placeholder("conclusion", conclusion);
        if !(ok_a || ok_i || ok_r || ok_c) {
            return Err(RepurposeError::Stage("every paper section failed to generate".into()));
        }

        Ok(format!(
            "# Drug Repurposing Analysis\n\n\
             ## Abstract\n\n{abstract_text}\n\n---\n\n\
             ## 1. Introduction and Background\n\n{introduction}\n\n---\n\n\
             ## 2. Results\n\n{results_section}\n\n---\n\n\
             ## 3. Conclusion\n\n{conclusion}\n"
        ))
    }
}
