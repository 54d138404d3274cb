//! Discovery stage against scripted oracles.

use std::sync::Arc;

use repurpose_common::events::{settle, DiscoveryEvent};
use repurpose_common::RepurposeError;
use repurpose_ingestion::DiscoveryStage;
use repurpose_test_utils::{assert_eq, drain, paper, recording_sink, MockLiterature, ScriptedLlm};

const DRUG_TABLE: &str = r#"```json
{"drugs": [
  {"drug": "Erlotinib", "proteins": ["EGFR"], "mechanism": "EGFR TKI", "fda_status": "Approved (NSCLC, pancreatic cancer)", "category": "mainstream"},
  {"drug": "Sotorasib (AMG 510)", "proteins": ["KRAS G12C"], "mechanism": "Covalent KRAS G12C inhibitor", "fda_status": "Approved (NSCLC)", "category": "repurposing_candidate"},
]}
```"#;

fn scripted_llm() -> ScriptedLlm {
    ScriptedLlm::new()
        .on("JSON repair assistant", r#"{"drugs": []}"#)
        .on("Extract the protein targets", r#"["KRAS", "EGFR", "kras"]"#)
        .on("data-extraction assistant", DRUG_TABLE)
        .on("scholarly literature review", "REVIEW-BODY")
        .on("expert pharmacology researcher", "DRUG-NARRATIVE")
        .on("polypharmacology", "REPURPOSING-NARRATIVE")
}

fn literature() -> MockLiterature {
    MockLiterature::new()
        .on("biomarker", vec![paper("2401.00001", "KRAS in PDAC"), paper("2401.00002", "Stroma")])
        .on("\"approved drug\"", vec![paper("2401.00002", "Stroma"), paper("2401.00003", "Erlotinib")])
        .on("\"drug repurposing\"", vec![paper("2401.00003", "Erlotinib"), paper("2401.00004", "Docking")])
}

#[tokio::test]
async fn test_discovery_happy_path() {
    let llm = Arc::new(scripted_llm());
    let stage = DiscoveryStage::new(llm.clone(), Arc::new(literature()));
    let (sink, mut rx) = recording_sink::<DiscoveryEvent>();

    let output = settle(&sink, stage.run("Pancreatic Ductal Adenocarcinoma", &sink))
        .await
        .unwrap();

    assert_eq!(output.protein_targets, vec!["KRAS".to_string(), "EGFR".to_string()]);
    assert_eq!(output.paper_count, 4);
    assert!(output.review_document.starts_with("# Literature Review: Pancreatic Ductal Adenocarcinoma"));
    assert!(output.review_document.contains("DRUG-NARRATIVE"));
    assert!(output.review_document.contains("REPURPOSING-NARRATIVE"));

    let names: Vec<_> = output.candidate_drugs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Erlotinib", "Sotorasib (AMG 510)"]);
    assert_eq!(output.candidate_drugs[1].proteins, vec!["KRAS G12C".to_string()]);
    // Trailing comma is handled locally, no repair needed
    assert_eq!(llm.calls_mentioning("JSON repair assistant"), 0);

    let events = drain(&mut rx);
    let kinds: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DiscoveryEvent::Proteins { .. } => Some("proteins"),
            DiscoveryEvent::Review { .. } => Some("review"),
            DiscoveryEvent::Drugs { .. } => Some("drugs"),
            DiscoveryEvent::Complete(_) => Some("complete"),
            DiscoveryEvent::Error { .. } => Some("error"),
            DiscoveryEvent::Progress { .. } => None,
        })
        .collect();
    assert_eq!(kinds, vec!["proteins", "review", "drugs", "complete"]);
    assert!(matches!(events[0], DiscoveryEvent::Progress { .. }));
}

#[tokio::test]
async fn test_empty_target_extraction_uses_defaults() {
    let llm = ScriptedLlm::new()
        .on("Extract the protein targets", "[]")
        .with_fallback("text");
    let llm = Arc::new(llm);
    let stage = DiscoveryStage::new(llm.clone(), Arc::new(MockLiterature::failing()));
    let (sink, _rx) = recording_sink::<DiscoveryEvent>();

    let output = stage.run("Pancreatic Ductal Adenocarcinoma", &sink).await.unwrap();

    assert_eq!(output.protein_targets, vec!["EGFR".to_string(), "p53".to_string(), "KRAS".to_string()]);
    assert_eq!(output.paper_count, 0);
    assert!(output.candidate_drugs.is_empty());
    let review_call = &llm.calls()[0];
    assert!(review_call.user.contains("(No papers found.)"));
}

#[tokio::test]
async fn test_malformed_drug_table_repaired_once() {
    let llm = ScriptedLlm::new()
        .on(
            "JSON repair assistant",
            r#"{"drugs": [{"drug": "Metformin", "proteins": ["AMPK"], "fda_status": "Approved (T2D)"}]}"#,
        )
        .on("Extract the protein targets", r#"["AMPK"]"#)
        .on("data-extraction assistant", r#"{"drugs": [{"drug": "Metformin", "proteins": ["AMPK"]"#)
        .with_fallback("narrative");
    let llm = Arc::new(llm);
    let stage = DiscoveryStage::new(llm.clone(), Arc::new(MockLiterature::new()));
    let (sink, _rx) = recording_sink::<DiscoveryEvent>();

    let output = stage.run("Glioblastoma", &sink).await.unwrap();

    assert_eq!(llm.calls_mentioning("JSON repair assistant"), 1);
    assert_eq!(output.candidate_drugs.len(), 1);
    assert_eq!(output.candidate_drugs[0].regulatory_status, "Approved (T2D)");
}

#[tokio::test]
async fn test_unrepairable_drug_table_degrades_to_empty() {
    let llm = ScriptedLlm::new()
        .on("JSON repair assistant", "still not json")
        .on("Extract the protein targets", r#"["EGFR"]"#)
        .on("data-extraction assistant", "Here are the drugs: erlotinib, gefitinib")
        .with_fallback("narrative");
    let llm = Arc::new(llm);
    let stage = DiscoveryStage::new(llm.clone(), Arc::new(MockLiterature::new()));
    let (sink, mut rx) = recording_sink::<DiscoveryEvent>();

    let output = settle(&sink, stage.run("NSCLC", &sink)).await.unwrap();

    assert!(output.candidate_drugs.is_empty());
    assert_eq!(llm.calls_mentioning("JSON repair assistant"), 1);
    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(DiscoveryEvent::Complete(_))));
}

#[tokio::test]
async fn test_empty_condition_rejected_before_any_call() {
    let llm = Arc::new(ScriptedLlm::new());
    let literature = Arc::new(MockLiterature::new());
    let stage = DiscoveryStage::new(llm.clone(), literature.clone());
    let (sink, mut rx) = recording_sink::<DiscoveryEvent>();

    let err = stage.run("   ", &sink).await.unwrap_err();

    assert!(matches!(err, RepurposeError::InvalidInput(_)));
    assert!(llm.calls().is_empty());
    assert!(literature.queries().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_review_failure_is_stage_error() {
    let llm = ScriptedLlm::new().fail_on("scholarly literature review", "upstream timeout");
    let stage = DiscoveryStage::new(Arc::new(llm), Arc::new(MockLiterature::new()));
    let (sink, mut rx) = recording_sink::<DiscoveryEvent>();

    let result = settle(&sink, stage.run("Melanoma", &sink)).await;

    assert!(result.is_err());
    let events = drain(&mut rx);
    match events.last() {
        Some(DiscoveryEvent::Error { message }) => assert!(message.contains("upstream timeout")),
        other => panic!("expected terminal error, got {other:?}"),
    }
    assert!(!events.iter().any(|e| matches!(e, DiscoveryEvent::Complete(_))));
}
