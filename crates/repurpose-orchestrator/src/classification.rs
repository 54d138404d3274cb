//! Deterministic compound classification from regulatory-status text.

use std::fmt;

use repurpose_common::DockingResult;
use serde::{Deserialize, Serialize};

/// Which of the three report buckets a docked compound falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundClass {
    /// Approved, and the status mentions this condition.
    AlreadyIndicated,
    /// Approved for something else.
    RepurposingCandidate,
    Novel,
}

impl CompoundClass {
    pub fn label(&self) -> &'static str {
        match self {
            CompoundClass::AlreadyIndicated => "Already indicated for this condition",
            CompoundClass::RepurposingCandidate => "Repurposing candidates",
            CompoundClass::Novel => "Novel/research compounds",
        }
    }
}

fn mentions_approval(status: &str) -> bool {
    status.contains("approved") || status.contains("fda")
}

/// Pure function of its inputs. The condition is matched on its first
/// whitespace-separated token, case-insensitively.
pub fn classify(regulatory_status: &str, condition: &str) -> CompoundClass {
    let status = regulatory_status.to_lowercase();
    if !mentions_approval(&status) {
        return CompoundClass::Novel;
    }
    let condition = condition.to_lowercase();
    match condition.split_whitespace().next() {
        Some(token) if status.contains(token) => CompoundClass::AlreadyIndicated,
        _ => CompoundClass::RepurposingCandidate,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub already_indicated: usize,
    pub repurposing_candidates: usize,
    pub novel: usize,
}

impl ClassCounts {
    pub fn tally(results: &[DockingResult], condition: &str) -> Self {
        results.iter().fold(Self::default(), |mut counts, r| {
            match classify(&r.regulatory_status, condition) {
                CompoundClass::AlreadyIndicated => counts.already_indicated += 1,
                CompoundClass::RepurposingCandidate => counts.repurposing_candidates += 1,
                CompoundClass::Novel => counts.novel += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.already_indicated + self.repurposing_candidates + self.novel
    }
}

impl fmt::Display for ClassCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", CompoundClass::AlreadyIndicated.label(), self.already_indicated)?;
        writeln!(f, "{}: {}", CompoundClass::RepurposingCandidate.label(), self.repurposing_candidates)?;
        write!(f, "{}: {}", CompoundClass::Novel.label(), self.novel)
    }
}
