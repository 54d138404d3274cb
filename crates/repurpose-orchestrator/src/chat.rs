//! Free-text questions about a finished (or partial) run.

use std::fmt::Write as _;

use repurpose_common::confidence::rank_descending;
use repurpose_common::error::require_non_empty;
use repurpose_common::{DockingResult, Result};
use repurpose_llm::{ask, LlmBackend};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::analyze::truncate_chars;

const CONTEXT_RESULTS: usize = 10;
const REVIEW_EXCERPT_CHARS: usize = 1500;

const SYSTEM: &str = "You are a knowledgeable drug discovery research assistant. \
    Answer the user's question concisely based on the provided context about their drug discovery pipeline results. \
    Use specific drug names, protein targets, and scores when relevant. \
    Keep responses focused and under 300 words.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub name: String,
    pub confidence: f64,
    pub protein: String,
    #[serde(default)]
    pub mechanism: String,
}

/// Everything in this struct is optional; an empty context sends the
/// question on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatContext {
    pub condition: Option<String>,
    pub proteins: Vec<String>,
    pub top_results: Vec<ChatResult>,
    pub review_excerpt: Option<String>,
}

impl ChatContext {
    pub fn from_run(condition: &str, proteins: &[String], results: &[DockingResult], review: &str) -> Self {
        let mut ranked = results.to_vec();
        rank_descending(&mut ranked);
        Self {
            condition: Some(condition.to_string()),
            proteins: proteins.to_vec(),
            top_results: ranked
                .into_iter()
                .take(CONTEXT_RESULTS)
                .map(|r| ChatResult {
                    name: r.ligand_name,
                    confidence: r.confidence_score,
                    protein: r.protein_target,
                    mechanism: r.mechanism,
                })
                .collect(),
            review_excerpt: Some(truncate_chars(review, REVIEW_EXCERPT_CHARS)).filter(|s| !s.is_empty()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(condition) = self.condition.as_deref().filter(|c| !c.trim().is_empty()) {
            let _ = writeln!(out, "Disease: {condition}");
        }
        if !self.proteins.is_empty() {
            let _ = writeln!(out, "Protein targets: {}", self.proteins.join(", "));
        }
        if !self.top_results.is_empty() {
            out.push_str("\nTop docking results:\n");
            for r in &self.top_results {
                let _ = writeln!(
                    out,
                    "- {}: {}% confidence against {} ({})",
                    r.name,
                    (r.confidence * 100.0).round(),
                    r.protein,
                    r.mechanism
                );
            }
        }
        if let Some(excerpt) = self.review_excerpt.as_deref().filter(|e| !e.trim().is_empty()) {
            let _ = write!(out, "\nLiterature review excerpt:\n{excerpt}\n");
        }
        out
    }
}

#[instrument(skip_all)]
pub async fn answer(llm: &dyn LlmBackend, question: &str, context: &ChatContext) -> Result<String> {
    require_non_empty("question", question)?;
    let rendered = context.render();
    let user = if rendered.is_empty() {
        question.to_string()
    } else {
        format!("Context:\n{rendered}\n\nQuestion: {question}")
    };
    Ok(ask(llm, SYSTEM, &user).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_context() {
        let ctx = ChatContext {
            condition: Some("Glioblastoma".into()),
            proteins: vec!["EGFR".into(), "IDH1".into()],
            top_results: vec![ChatResult {
                name: "Temozolomide".into(),
                confidence: 0.876,
                protein: "EGFR".into(),
                mechanism: "Alkylating agent".into(),
            }],
            review_excerpt: None,
        };
        assert_eq!(
            ctx.render(),
            "Disease: Glioblastoma\nProtein targets: EGFR, IDH1\n\nTop docking results:\n\
             - Temozolomide: 88% confidence against EGFR (Alkylating agent)\n"
        );
        assert_eq!(ChatContext::default().render(), "");
    }
}
