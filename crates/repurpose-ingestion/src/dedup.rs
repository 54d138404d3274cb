//! Deduplication of papers gathered from several queries.

use std::collections::HashSet;

use crate::models::Paper;

/// Append `incoming` papers to `base`, skipping any whose id is already
/// present in `base`, in `exclude`, or earlier in `incoming`.
///
/// Returns how many papers were added.
pub fn merge_unique(base: &mut Vec<Paper>, incoming: Vec<Paper>, exclude: &[Paper]) -> usize {
    let mut seen: HashSet<String> = base
        .iter()
        .chain(exclude.iter())
        .map(|p| normalise_id(&p.id))
        .collect();
    let before = base.len();
    base.extend(incoming.into_iter().filter(|p| seen.insert(normalise_id(&p.id))));
    base.len() - before
}

/// Remove duplicates within one list, keeping the first occurrence.
pub fn dedup_in_place(papers: &mut Vec<Paper>) {
    let mut seen = HashSet::new();
    papers.retain(|p| seen.insert(normalise_id(&p.id)));
}

fn normalise_id(id: &str) -> String {
    id.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSource;

    fn paper(id: &str) -> Paper {
        Paper {
            id: id.into(),
            title: format!("paper {id}"),
            summary: String::new(),
            authors: vec![],
            published: None,
            link: None,
            source: PaperSource::Arxiv,
        }
    }

    #[test]
    fn test_merge_unique() {
        let background = vec![paper("1")];
        let mut drug = vec![paper("2"), paper("3")];
        dedup_in_place(&mut drug);
        let added = merge_unique(&mut drug, vec![paper("3"), paper("1"), paper("4"), paper("4")], &background);
        assert_eq!(added, 1);
        let ids: Vec<_> = drug.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["2", "3", "4"]);
    }

    #[test]
    fn test_dedup_in_place_is_case_insensitive() {
        let mut papers = vec![paper("PMC1"), paper("pmc1"), paper("PMC2")];
        dedup_in_place(&mut papers);
        assert_eq!(papers.len(), 2);
    }
}
