//! Literature source clients.

pub mod arxiv;
pub mod europepmc;

use async_trait::async_trait;
use crate::models::Paper;

/// Targets included in a biased query.
const QUERY_TARGETS: usize = 6;

const REPURPOSING_TERMS: &[&str] = &[
    "drug repurposing",
    "drug repositioning",
    "molecular docking",
    "virtual screening",
    "off-target",
    "binding affinity",
    "structure-activity",
    "polypharmacology",
];

fn quoted_or(terms: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    terms
        .into_iter()
        .map(|t| format!("\"{}\"", t.as_ref()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Common interface for all literature source clients.
///
/// The query builders produce plain boolean queries; a source whose search
/// syntax needs a field prefix overrides [`LiteratureSource::scope`].
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Search for papers matching a query, returns metadata list.
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Paper>>;

    fn name(&self) -> &'static str;

    /// Wrap a boolean expression in the source's field syntax.
    fn scope(&self, expr: String) -> String {
        expr
    }

    /// Background papers on a condition.
    fn background_query(&self, condition: &str) -> String {
        self.scope(format!(
            "(\"{condition}\" AND (treatment OR therapy OR target OR protein OR pathway OR molecular OR biomarker))"
        ))
    }

    /// Approved drugs and inhibitors for the condition's leading targets.
    fn drug_query(&self, condition: &str, proteins: &[String]) -> String {
        let targets = quoted_or(proteins.iter().take(QUERY_TARGETS));
        self.scope(format!(
            "(\"{condition}\" AND (FDA OR \"approved drug\" OR inhibitor OR therapeutic) AND ({targets}))"
        ))
    }

    /// Repurposing and docking work on the leading targets, any indication.
    fn repurposing_query(&self, proteins: &[String]) -> String {
        let targets = quoted_or(proteins.iter().take(QUERY_TARGETS));
        let terms = quoted_or(REPURPOSING_TERMS);
        self.scope(format!("(({targets}) AND ({terms}))"))
    }
}
