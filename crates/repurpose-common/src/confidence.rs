/// Confidence handling for docking results.
///
/// Scores come from the docking oracle and are trusted as-is; this module
/// only bounds them and orders result lists.
use tracing::warn;

use crate::entities::DockingResult;

/// Bound an oracle score to [0.0, 1.0].
///
/// Returns `None` for NaN, which has no meaningful position in a ranking.
pub fn clamp_confidence(raw: f64, ligand: &str) -> Option<f64> {
    if raw.is_nan() {
        warn!(ligand, "Docking oracle returned NaN confidence, dropping result");
        return None;
    }
    if !(0.0..=1.0).contains(&raw) {
        warn!(ligand, score = raw, "Confidence outside [0, 1], clamping");
    }
    Some(raw.clamp(0.0, 1.0))
}

/// Sort descending by confidence. Stable: ties keep their incoming order.
pub fn rank_descending(results: &mut [DockingResult]) {
    results.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
}

/// Round to four decimals for summaries.
pub fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Provenance;

    fn result(name: &str, score: f64) -> DockingResult {
        DockingResult {
            ligand_name: name.to_string(),
            confidence_score: score,
            confidence_raw: score,
            mechanism: String::new(),
            regulatory_status: String::new(),
            provenance: Provenance::Unresolved,
            protein_target: "EGFR".to_string(),
            structure_id: "1M17".to_string(),
            round: 1,
            poses: None,
        }
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_confidence(1.7, "x"), Some(1.0));
        assert_eq!(clamp_confidence(-0.2, "x"), Some(0.0));
        assert_eq!(clamp_confidence(0.42, "x"), Some(0.42));
        assert_eq!(clamp_confidence(f64::NAN, "x"), None);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let mut rs = vec![result("a", 0.5), result("b", 0.9), result("c", 0.5), result("d", 0.7)];
        rank_descending(&mut rs);
        let names: Vec<_> = rs.iter().map(|r| r.ligand_name.as_str()).collect();
        assert_eq!(names, ["b", "d", "a", "c"]);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
    }
}
