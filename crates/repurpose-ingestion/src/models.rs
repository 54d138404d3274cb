//! Data models for literature search results.

use serde::{Deserialize, Serialize};

/// A paper returned by a literature source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Source-scoped identifier (arXiv id, PMID/PMCID, DOI); the dedup key.
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    /// `YYYY-MM-DD` when known.
    pub published: Option<String>,
    pub link: Option<String>,
    pub source: PaperSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperSource {
    Arxiv,
    EuropePmc,
}

impl PaperSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperSource::Arxiv     => "arxiv",
            PaperSource::EuropePmc => "europepmc",
        }
    }

    fn id_label(&self) -> &'static str {
        match self {
            PaperSource::Arxiv     => "arXiv ID",
            PaperSource::EuropePmc => "Europe PMC ID",
        }
    }
}

const ABSTRACT_PROMPT_CHARS: usize = 500;
const AUTHORS_SHOWN: usize = 3;

impl Paper {
    fn author_line(&self) -> String {
        let mut line = self.authors.iter().take(AUTHORS_SHOWN).cloned().collect::<Vec<_>>().join(", ");
        if self.authors.len() > AUTHORS_SHOWN {
            line.push_str(" et al.");
        }
        line
    }
}

/// Render papers as a numbered list for inclusion in a prompt.
pub fn format_for_prompt(papers: &[Paper]) -> String {
    papers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let summary: String = p.summary.chars().take(ABSTRACT_PROMPT_CHARS).collect();
            format!(
                "[{}] {}\n    Authors: {}\n    Published: {}\n    {}: {}\n    Abstract: {}...\n",
                i + 1,
                p.title,
                p.author_line(),
                p.published.as_deref().unwrap_or("unknown"),
                p.source.id_label(),
                p.id,
                summary,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(authors: &[&str], summary: &str) -> Paper {
        Paper {
            id: "2401.00001v1".into(),
            title: "KRAS inhibition in PDAC".into(),
            summary: summary.into(),
            authors: authors.iter().map(|s| s.to_string()).collect(),
            published: Some("2024-01-02".into()),
            link: None,
            source: PaperSource::Arxiv,
        }
    }

    #[test]
    fn test_author_line_truncates_with_et_al() {
        assert_eq!(paper(&["A", "B"], "").author_line(), "A, B");
        assert_eq!(paper(&["A", "B", "C", "D"], "").author_line(), "A, B, C et al.");
    }

    #[test]
    fn test_format_truncates_abstract() {
        let long = "x".repeat(800);
        let text = format_for_prompt(&[paper(&["A"], &long)]);
        assert!(text.starts_with("[1] KRAS inhibition in PDAC\n"));
        assert!(text.contains("arXiv ID: 2401.00001v1"));
        assert!(text.contains(&format!("Abstract: {}...", "x".repeat(500))));
        assert!(!text.contains(&"x".repeat(501)));
    }
}
