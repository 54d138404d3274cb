//! Structure acquisition against scripted structure and compound databases.

use std::sync::Arc;

use repurpose_common::events::{settle, StructureEvent};
use repurpose_common::{CandidateDrug, DockingTarget, Provenance, RepurposeError};
use repurpose_molecules::StructureStage;
use repurpose_test_utils::{assert_eq, compound, drain, recording_sink, MockCompounds, MockStructures};

fn drug(name: &str, proteins: &[&str], status: &str) -> CandidateDrug {
    CandidateDrug {
        name: name.into(),
        proteins: proteins.iter().map(|p| p.to_string()).collect(),
        mechanism: format!("{name} mechanism"),
        regulatory_status: status.into(),
        category: "mainstream".into(),
    }
}

fn proteins(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn target<'a>(targets: &'a [DockingTarget], protein: &str) -> &'a DockingTarget {
    targets.iter().find(|t| t.protein.name == protein).unwrap()
}

#[tokio::test]
async fn test_first_token_fallback_finds_structure() {
    let structures = Arc::new(MockStructures::new().with_entry("EGFR", "1M17", true, 2.6));
    let stage = StructureStage::new(structures.clone(), Arc::new(MockCompounds::new()));
    let (sink, _rx) = recording_sink::<StructureEvent>();

    let output = stage.run(&proteins(&["EGFR kinase domain"]), &[], &sink).await.unwrap();

    let t = &output.docking_targets[0];
    assert_eq!(t.protein.resolved_structure_id.as_deref(), Some("1M17"));
    assert_eq!(t.protein.structure_blob.as_deref(), Some("1M17-blob"));
    assert_eq!(structures.searches(), vec!["EGFR kinase domain".to_string(), "EGFR".to_string()]);
}

#[tokio::test]
async fn test_ligand_bound_structure_preferred() {
    let structures = MockStructures::new()
        .with_entry("KRAS", "4OBE", false, 1.2)
        .with_entry("KRAS", "6OIM", true, 1.65)
        .with_entry("KRAS", "5VQ2", true, 2.1);
    let stage = StructureStage::new(Arc::new(structures), Arc::new(MockCompounds::new()));
    let (sink, _rx) = recording_sink::<StructureEvent>();

    let output = stage.run(&proteins(&["KRAS"]), &[], &sink).await.unwrap();

    assert_eq!(output.docking_targets[0].protein.resolved_structure_id.as_deref(), Some("6OIM"));
}

#[tokio::test]
async fn test_parenthetical_variant_resolves_under_original_name() {
    let compounds = Arc::new(
        MockCompounds::new()
            .with_name("AMG 510", compound(137278711, "C=CC(=O)N1CCN"))
            .with_name("Erlotinib", compound(176870, "COCCOC1=C")),
    );
    let drugs = vec![
        drug("Erlotinib", &["EGFR"], "Approved"),
        drug("Sotorasib (AMG 510)", &["KRAS G12C"], ""),
    ];
    let stage = StructureStage::new(Arc::new(MockStructures::new()), compounds.clone());
    let (sink, _rx) = recording_sink::<StructureEvent>();

    let output = stage.run(&proteins(&["KRAS"]), &drugs, &sink).await.unwrap();

    let ligands = &output.docking_targets[0].ligands;
    assert_eq!(ligands.len(), 1);
    assert_eq!(ligands[0].name, "Sotorasib (AMG 510)");
    assert_eq!(ligands[0].canonical_structure, "C=CC(=O)N1CCN");
    assert_eq!(ligands[0].regulatory_status, "Unknown");
    assert_eq!(ligands[0].provenance, Provenance::Literature { cid: 137278711 });
    assert_eq!(
        compounds.lookups(),
        vec!["Sotorasib (AMG 510)".to_string(), "Sotorasib".to_string(), "AMG 510".to_string()]
    );
}

#[tokio::test]
async fn test_unmatched_protein_tries_every_drug() {
    let compounds = MockCompounds::new()
        .with_name("Erlotinib", compound(176870, "C1"))
        .with_name("Metformin", compound(4091, "C2"));
    let drugs = vec![
        drug("Erlotinib", &["EGFR"], "Approved"),
        drug("Metformin", &["AMPK"], "Approved"),
        drug("Unobtainium", &["EGFR"], "Preclinical"),
    ];
    let stage = StructureStage::new(Arc::new(MockStructures::new()), Arc::new(compounds));
    let (sink, _rx) = recording_sink::<StructureEvent>();

    let output = stage.run(&proteins(&["TP53"]), &drugs, &sink).await.unwrap();

    let names: Vec<_> = output.docking_targets[0].ligands.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Erlotinib", "Metformin"]);
    assert!(!output.docking_targets[0].protein.has_structure());
}

#[tokio::test]
async fn test_one_failing_protein_does_not_sink_the_stage() {
    let structures = MockStructures::new()
        .with_entry("EGFR", "1M17", true, 2.6)
        .failing_on("BRAF");
    let compounds = MockCompounds::new()
        .with_name("Erlotinib", compound(176870, "C1"))
        .failing_on("Vemurafenib");
    let drugs = vec![drug("Erlotinib", &["EGFR"], "Approved"), drug("Vemurafenib", &["BRAF"], "Approved")];
    let stage = StructureStage::new(Arc::new(structures), Arc::new(compounds));
    let (sink, mut rx) = recording_sink::<StructureEvent>();

    let output = settle(&sink, stage.run(&proteins(&["EGFR", "BRAF"]), &drugs, &sink))
        .await
        .unwrap();

    assert_eq!(output.docking_targets.len(), 2);
    let egfr = target(&output.docking_targets, "EGFR");
    assert!(egfr.protein.has_structure());
    assert_eq!(egfr.ligands.len(), 1);
    let braf = target(&output.docking_targets, "BRAF");
    assert!(!braf.protein.has_structure());
    assert!(braf.ligands.is_empty());

    let events = drain(&mut rx);
    let mut completed: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::Target { completed, total, .. } => {
                assert_eq!(*total, 2);
                Some(*completed)
            }
            _ => None,
        })
        .collect();
    completed.sort();
    assert_eq!(completed, vec![1, 2]);
    assert!(matches!(events.last(), Some(StructureEvent::Complete(_))));
}

#[tokio::test]
async fn test_empty_protein_list_rejected() {
    let stage = StructureStage::new(Arc::new(MockStructures::new()), Arc::new(MockCompounds::new()));
    let (sink, mut rx) = recording_sink::<StructureEvent>();

    let result = settle(&sink, stage.run(&proteins(&["", "  "]), &[], &sink)).await;

    assert!(matches!(result, Err(RepurposeError::InvalidInput(_))));
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StructureEvent::Error { .. }));
}
