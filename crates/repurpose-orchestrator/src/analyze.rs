//! Reasoning over docking results: expand the search, or proceed to the report.
//!
//! The text-completion oracle proposes an action; this module validates it.
//! Unknown actions become `proceed`, and from round `MAX_EXPANSION_ROUNDS + 1`
//! on the decision is always `proceed` whatever the oracle said.

use std::sync::Arc;

use repurpose_common::confidence::{rank_descending, round4};
use repurpose_common::error::require_non_empty;
use repurpose_common::{
    DockingResult, ExpansionAction, ExpansionRecord, ReasoningDecision, RepurposeError, Result,
    MAX_EXPANSION_ROUNDS,
};
use repurpose_llm::{ask, parse_or_default, LlmBackend, ParseOutcome};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

/// Results shown to the oracle, best first.
pub const SUMMARY_ROWS: usize = 30;
const MECHANISM_CHARS: usize = 100;
const STATUS_CHARS: usize = 60;

pub const MAX_ROUNDS_NOTE: &str = " (Max rounds reached, proceeding to synthesis.)";

/// One docking result as presented to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub name: String,
    pub score: f64,
    pub mechanism: String,
    pub fda_status: String,
    pub protein: String,
    pub source: String,
    pub round: u32,
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Top [`SUMMARY_ROWS`] results by confidence.
pub fn summarize(results: &[DockingResult]) -> Vec<SummaryRow> {
    let mut sorted = results.to_vec();
    rank_descending(&mut sorted);
    sorted
        .into_iter()
        .take(SUMMARY_ROWS)
        .map(|r| SummaryRow {
            name: r.ligand_name,
            score: round4(r.confidence_score),
            mechanism: truncate_chars(&r.mechanism, MECHANISM_CHARS),
            fda_status: truncate_chars(&r.regulatory_status, STATUS_CHARS),
            protein: r.protein_target,
            source: r.provenance.to_string(),
            round: r.round,
        })
        .collect()
}

pub struct ReasoningInput<'a> {
    pub condition: &'a str,
    /// Every result so far, all rounds.
    pub results: &'a [DockingResult],
    pub round: u32,
    pub prior_hypotheses: &'a [String],
    pub prior_actions: &'a [ExpansionRecord],
}

fn system_prompt(round: u32) -> String {
    let last = MAX_EXPANSION_ROUNDS + 1;
    format!(
        "You are a computational pharmacology researcher reviewing molecular docking results \
         for drug repurposing. Reply with ONLY valid JSON.\n\n\
         Look for patterns among the top hits:\n\
         - Do drugs of one therapeutic class cluster at the top (statins, SSRIs, kinase inhibitors)?\n\
         - Do the top compounds share structural features?\n\
         - Is there an untested drug class worth trying?\n\n\
         Return an object with:\n\
         \x20 \"action\": \"expand_similarity\", \"expand_class\" or \"proceed\"\n\
         \x20 \"rationale\": two or three sentences on the patterns you see\n\
         \x20 \"hypothesis\": one specific, testable hypothesis\n\
         \x20 \"seed_cids\": PubChem CIDs to search around (expand_similarity only)\n\
         \x20 \"drug_class\": class name (expand_class only)\n\
         \x20 \"drug_names\": drugs in that class (expand_class only)\n\n\
         Rules:\n\
         - This is round {round} of at most {last}.\n\
         - From round {last} on you MUST choose \"proceed\".\n\
         - Only expand when a clear pattern justifies it, and name the CIDs or drugs to test."
    )
}

fn user_prompt(input: &ReasoningInput<'_>, rows: &[SummaryRow]) -> Result<String> {
    Ok(format!(
        "Condition: {}\nRound: {}\nPrevious hypotheses: {}\nPrevious expansions: {}\n\n\
         Top {} docking results (by confidence):\n{}\n\n\
         Analyze these results and return your decision as JSON.",
        input.condition,
        input.round,
        serde_json::to_string(input.prior_hypotheses)?,
        serde_json::to_string(input.prior_actions)?,
        rows.len(),
        serde_json::to_string_pretty(rows)?,
    ))
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or("").trim().to_string()
}

fn first_present<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| v.get(*k).filter(|x| !x.is_null()))
}

/// Accepts numbers and numeric strings.
fn id_list(v: Option<&Value>) -> Vec<u64> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|x| x.as_u64().or_else(|| x.as_str().and_then(|s| s.trim().parse().ok())))
                .collect()
        })
        .unwrap_or_default()
}

fn name_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Build a decision from the oracle's JSON. Unknown or missing actions
/// become `proceed`; fields that do not belong to the action are dropped.
pub fn decision_from_value(v: &Value) -> ReasoningDecision {
    let label = str_field(v, "action");
    let action = ExpansionAction::from_label(&label).unwrap_or_else(|| {
        if !label.is_empty() {
            warn!(action = %label, "Unrecognised reasoning action, proceeding");
        }
        ExpansionAction::Proceed
    });

    let mut decision = ReasoningDecision {
        action,
        rationale: str_field(v, "rationale"),
        hypothesis: str_field(v, "hypothesis"),
        seed_identifiers: None,
        drug_class: None,
        drug_names: None,
    };
    match action {
        ExpansionAction::ExpandSimilarity => {
            decision.seed_identifiers =
                Some(id_list(first_present(v, &["seed_cids", "seedCids", "seed_identifiers", "seedIdentifiers"])));
        }
        ExpansionAction::ExpandClass => {
            let class = first_present(v, &["drug_class", "drugClass"])
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string());
            decision.drug_class = Some(class.unwrap_or_default());
            decision.drug_names = Some(name_list(first_present(v, &["drug_names", "drugNames"])));
        }
        ExpansionAction::Proceed => {}
    }
    decision
}

/// Force `proceed` once the round limit is reached.
pub fn apply_round_limit(mut decision: ReasoningDecision, round: u32) -> ReasoningDecision {
    if round > MAX_EXPANSION_ROUNDS {
        decision.action = ExpansionAction::Proceed;
        decision.rationale.push_str(MAX_ROUNDS_NOTE);
        decision.seed_identifiers = None;
        decision.drug_class = None;
        decision.drug_names = None;
    }
    decision
}

pub struct Reasoner {
    llm: Arc<dyn LlmBackend>,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    #[instrument(skip_all, fields(round = input.round, results = input.results.len()))]
    pub async fn decide(&self, input: ReasoningInput<'_>) -> Result<ReasoningDecision> {
        require_non_empty("conditionName", input.condition)?;
        if input.results.is_empty() {
            return Err(RepurposeError::InvalidInput("allResultsSoFar is required".into()));
        }
        if input.round == 0 {
            return Err(RepurposeError::InvalidInput("round starts at 1".into()));
        }

        let rows = summarize(input.results);
        let raw = ask(self.llm.as_ref(), &system_prompt(input.round), &user_prompt(&input, &rows)?).await?;
        let (value, outcome) = parse_or_default::<Value>(self.llm.as_ref(), &raw).await;

        let mut decision = decision_from_value(&value);
        if outcome == ParseOutcome::Defaulted {
            decision.rationale = "Reasoning response could not be parsed; proceeding.".to_string();
        }
        let decision = apply_round_limit(decision, input.round);
        info!(round = input.round, action = %decision.action, "Reasoning decision");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repurpose_common::Provenance;
    use serde_json::json;

    fn result(name: &str, score: f64) -> DockingResult {
        DockingResult {
            ligand_name: name.into(),
            confidence_score: score,
            confidence_raw: 0.0,
            mechanism: "m".repeat(150),
            regulatory_status: "s".repeat(80),
            provenance: Provenance::Literature { cid: 7 },
            protein_target: "EGFR".into(),
            structure_id: "1M17".into(),
            round: 1,
            poses: None,
        }
    }

    #[test]
    fn test_summary_is_top_30_truncated() {
        let results: Vec<_> = (0..40).map(|i| result(&format!("d{i}"), i as f64 / 100.0)).collect();
        let rows = summarize(&results);
        assert_eq!(rows.len(), 30);
        assert_eq!(rows[0].name, "d39");
        assert_eq!(rows[0].score, 0.39);
        assert_eq!(rows[0].mechanism.len(), 100);
        assert_eq!(rows[0].fda_status.len(), 60);
        assert_eq!(rows[0].source, "pubchem_cid_7");
    }

    #[test]
    fn test_unknown_action_coerced_to_proceed() {
        let d = decision_from_value(&json!({"action": "expand_everything", "rationale": "r", "seed_cids": [1]}));
        assert_eq!(d.action, ExpansionAction::Proceed);
        assert_eq!(d.seed_identifiers, None);

        let d = decision_from_value(&Value::Null);
        assert_eq!(d.action, ExpansionAction::Proceed);
    }

    #[test]
    fn test_similarity_alias_and_seed_parsing() {
        let d = decision_from_value(&json!({
            "action": "expand_3d_similar",
            "rationale": "statins cluster",
            "hypothesis": "h",
            "seed_cids": [60823, "54454", "x"]
        }));
        assert_eq!(d.action, ExpansionAction::ExpandSimilarity);
        assert_eq!(d.seed_identifiers, Some(vec![60823, 54454]));
        assert_eq!(d.drug_class, None);
    }

    #[test]
    fn test_class_fields() {
        let d = decision_from_value(&json!({"action": "expand_class", "drug_class": "statins"}));
        assert_eq!(d.drug_class.as_deref(), Some("statins"));
        assert_eq!(d.drug_names, Some(vec![]));
    }

    #[test]
    fn test_round_limit_forces_proceed() {
        let d = decision_from_value(&json!({"action": "expand_similarity", "rationale": "more", "seed_cids": [1]}));
        let kept = apply_round_limit(d.clone(), MAX_EXPANSION_ROUNDS);
        assert_eq!(kept.action, ExpansionAction::ExpandSimilarity);

        let forced = apply_round_limit(d, MAX_EXPANSION_ROUNDS + 1);
        assert_eq!(forced.action, ExpansionAction::Proceed);
        assert!(forced.rationale.ends_with("(Max rounds reached, proceeding to synthesis.)"));
        assert_eq!(forced.seed_identifiers, None);
    }
}
