//! The pipeline controller.
//!
//! Runs the stages strictly in sequence and owns all cross-round state:
//! discovery, structures, docking round 1, then reasoning and optional
//! expansion rounds, then the report and the final paper. Stages only see
//! borrowed slices of the state and hand back values the controller folds in.

use std::sync::Arc;

use repurpose_common::events::{
    settle, DiscoveryEvent, DiscoveryOutput, DockEvent, DockingOutput, StructureEvent, StructureOutput,
};
use repurpose_common::{
    CandidateDrug, DockingResult, DockingTarget, EventSink, ExpansionRecord, ReasoningDecision, Result,
    StageEvent, MAX_EXPANSION_ROUNDS,
};
use repurpose_ingestion::{DiscoveryStage, LiteratureSource};
use repurpose_llm::LlmBackend;
use repurpose_molecules::{CompoundSource, DockingOptions, DockingService, DockingStage, StructureSource, StructureStage};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::analyze::{Reasoner, ReasoningInput};
use crate::expansion::{Expander, ExpansionRequest};
use crate::merge::{merge_duplicates, MergedDrug};
use crate::report::ReportWriter;

// ── Oracles ─────────────────────────────────────────────────────────────────

/// The five external services every stage is built from.
#[derive(Clone)]
pub struct Oracles {
    pub llm: Arc<dyn LlmBackend>,
    pub literature: Arc<dyn LiteratureSource>,
    pub structures: Arc<dyn StructureSource>,
    pub compounds: Arc<dyn CompoundSource>,
    pub docking: Arc<dyn DockingService>,
}

impl Oracles {
    pub fn discovery(&self, max_papers: usize) -> DiscoveryStage {
        DiscoveryStage::new(self.llm.clone(), self.literature.clone()).with_max_papers(max_papers)
    }

    pub fn structure_stage(&self) -> StructureStage {
        StructureStage::new(self.structures.clone(), self.compounds.clone())
    }

    pub fn docking_stage(&self, options: DockingOptions) -> DockingStage {
        DockingStage::new(self.docking.clone()).with_options(options)
    }

    pub fn reasoner(&self) -> Reasoner {
        Reasoner::new(self.llm.clone())
    }

    pub fn expander(&self) -> Expander {
        Expander::new(self.llm.clone(), self.compounds.clone())
    }

    pub fn report_writer(&self) -> ReportWriter {
        ReportWriter::new(self.llm.clone())
    }
}

// ── Options ─────────────────────────────────────────────────────────────────

/// Whether the controller acts on expansion decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionPolicy {
    #[default]
    Auto,
    /// Reason and record decisions, but never expand.
    Never,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub expansion: ExpansionPolicy,
    pub docking: DockingOptions,
    pub max_papers: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            expansion: ExpansionPolicy::Auto,
            docking: DockingOptions::default(),
            max_papers: 15,
        }
    }
}

// ── State ───────────────────────────────────────────────────────────────────

/// Everything accumulated across rounds. Only the controller writes to it.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub condition: String,
    pub review: String,
    pub paper_count: usize,
    pub proteins: Vec<String>,
    pub candidate_drugs: Vec<CandidateDrug>,
    pub docking_targets: Vec<DockingTarget>,
    pub all_results: Vec<DockingResult>,
    pub round: u32,
    pub hypotheses: Vec<String>,
    pub history: Vec<ExpansionRecord>,
}

impl PipelineState {
    pub fn new(condition: &str) -> Self {
        Self { condition: condition.trim().to_string(), ..Self::default() }
    }

    pub fn absorb_discovery(&mut self, out: DiscoveryOutput) {
        self.review = out.review_document;
        self.paper_count = out.paper_count;
        self.proteins = out.protein_targets;
        self.candidate_drugs = out.candidate_drugs;
    }

    pub fn absorb_structures(&mut self, out: StructureOutput) {
        self.docking_targets = out.docking_targets;
    }

    /// Append a round's results and keep the whole list ranked.
    pub fn absorb_docking(&mut self, out: DockingOutput) {
        self.all_results.extend(out.all_results);
        repurpose_common::confidence::rank_descending(&mut self.all_results);
    }

    /// Fold expansion targets into the accumulated targets. Returns how many
    /// ligands were actually new.
    pub fn absorb_expansion(&mut self, new_targets: &[DockingTarget]) -> usize {
        let mut added = 0;
        for incoming in new_targets {
            match self.docking_targets.iter_mut().find(|t| t.protein.name == incoming.protein.name) {
                Some(existing) => added += existing.extend_unique(incoming.ligands.iter().cloned()),
                None => {
                    let mut target = DockingTarget::new(incoming.protein.clone(), Vec::new());
                    added += target.extend_unique(incoming.ligands.iter().cloned());
                    self.docking_targets.push(target);
                }
            }
        }
        added
    }

    pub fn record(&mut self, round: u32, decision: &ReasoningDecision) {
        if !decision.hypothesis.is_empty() {
            self.hypotheses.push(decision.hypothesis.clone());
        }
        self.history.push(ExpansionRecord {
            round,
            action: decision.action,
            rationale: decision.rationale.clone(),
            hypothesis: decision.hypothesis.clone(),
        });
    }

    fn into_outcome(self, report: Option<String>, final_document: Option<String>) -> PipelineOutcome {
        let merged_drugs = merge_duplicates(&self.all_results);
        PipelineOutcome {
            condition: self.condition,
            review_document: self.review,
            paper_count: self.paper_count,
            protein_targets: self.proteins,
            candidate_drugs: self.candidate_drugs,
            docking_targets: self.docking_targets,
            all_results: self.all_results,
            merged_drugs,
            rounds: self.round,
            history: self.history,
            report,
            final_document,
        }
    }
}

// ── Outcome & events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub condition: String,
    pub review_document: String,
    pub paper_count: usize,
    pub protein_targets: Vec<String>,
    pub candidate_drugs: Vec<CandidateDrug>,
    pub docking_targets: Vec<DockingTarget>,
    /// Every round's results, best first.
    pub all_results: Vec<DockingResult>,
    /// One row per drug across targets and rounds, best first.
    #[serde(default)]
    pub merged_drugs: Vec<MergedDrug>,
    pub rounds: u32,
    pub history: Vec<ExpansionRecord>,
    pub report: Option<String>,
    pub final_document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    Discovery(DiscoveryEvent),
    Structures(StructureEvent),
    Docking { round: u32, event: DockEvent },
    Decision { round: u32, decision: ReasoningDecision },
    Expansion { round: u32, new_targets: usize, new_ligands: usize },
    Progress { message: String },
    /// Something degraded but the run continues.
    Warning { message: String },
    Complete(PipelineOutcome),
    Error { message: String },
}

impl StageEvent for PipelineEvent {
    type Output = PipelineOutcome;

    fn complete(output: PipelineOutcome) -> Self {
        Self::Complete(output)
    }

    fn error(message: String) -> Self {
        Self::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

// ── Controller ──────────────────────────────────────────────────────────────

pub struct Pipeline {
    oracles: Oracles,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(oracles: Oracles) -> Self {
        Self { oracles, options: PipelineOptions::default() }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the whole pipeline for `condition`. Terminal events are left to
    /// the caller, as with the individual stages.
    #[instrument(skip(self, sink))]
    pub async fn run(&self, condition: &str, sink: &EventSink<PipelineEvent>) -> Result<PipelineOutcome> {
        repurpose_common::error::require_non_empty("conditionName", condition)?;
        let mut state = PipelineState::new(condition);
        let progress = |message: String| sink.emit(PipelineEvent::Progress { message });
        let warning = |message: String| {
            warn!("{message}");
            sink.emit(PipelineEvent::Warning { message });
        };

        // ── Discovery ───────────────────────────────────────────────────────
        let discovery_sink = sink.map(PipelineEvent::Discovery);
        let discovery = self.oracles.discovery(self.options.max_papers);
        let out = settle(&discovery_sink, discovery.run(&state.condition, &discovery_sink)).await?;
        state.absorb_discovery(out);

        // ── Structures ──────────────────────────────────────────────────────
        let structure_sink = sink.map(PipelineEvent::Structures);
        let structures = self.oracles.structure_stage();
        let out = settle(
            &structure_sink,
            structures.run(&state.proteins, &state.candidate_drugs, &structure_sink),
        )
        .await?;
        state.absorb_structures(out);

        // ── Docking round 1 ─────────────────────────────────────────────────
        let docking = self.oracles.docking_stage(self.options.docking.clone());
        state.round = 1;
        let out = self.dock(&docking, &state.docking_targets, state.round, sink).await?;
        state.absorb_docking(out);

        // ── Reason / expand / redock ────────────────────────────────────────
        let reasoner = self.oracles.reasoner();
        let expander = self.oracles.expander();
        loop {
            let round = state.round;
            let decision = if state.all_results.is_empty() {
                ReasoningDecision::proceed("No docking results to analyze.")
            } else {
                let input = ReasoningInput {
                    condition: &state.condition,
                    results: &state.all_results,
                    round,
                    prior_hypotheses: &state.hypotheses,
                    prior_actions: &state.history,
                };
                match reasoner.decide(input).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        warning(format!("Reasoning failed in round {round}, proceeding: {e}"));
                        ReasoningDecision::proceed(format!("Reasoning failed: {e}"))
                    }
                }
            };
            sink.emit(PipelineEvent::Decision { round, decision: decision.clone() });
            state.record(round, &decision);

            if !decision.action.is_expansion() || round > MAX_EXPANSION_ROUNDS {
                break;
            }
            if self.options.expansion == ExpansionPolicy::Never {
                progress(format!("Expansion disabled, skipping {}", decision.action));
                break;
            }

            progress(format!("Round {round}: {}", decision.action));
            let request = ExpansionRequest {
                decision: &decision,
                proteins: &state.proteins,
                existing: &state.docking_targets,
                results: &state.all_results,
            };
            let new_targets = match expander.expand(request).await {
                Ok(targets) => targets,
                Err(e) => {
                    warning(format!("Expansion failed in round {round}: {e}"));
                    break;
                }
            };
            if new_targets.is_empty() {
                progress("Expansion found no new ligands; moving on to the report".to_string());
                break;
            }

            let new_ligands = state.absorb_expansion(&new_targets);
            sink.emit(PipelineEvent::Expansion { round, new_targets: new_targets.len(), new_ligands });

            state.round += 1;
            let out = self.dock(&docking, &new_targets, state.round, sink).await?;
            state.absorb_docking(out);
        }

        // ── Report and paper ────────────────────────────────────────────────
        let writer = self.oracles.report_writer();
        let report = if state.all_results.is_empty() {
            warning("No docking results; skipping the report".to_string());
            None
        } else {
            progress("Writing report...".to_string());
            match writer.write_report(&state.condition, &state.all_results, &state.docking_targets).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warning(format!("Report failed: {e}"));
                    None
                }
            }
        };

        let final_document = match report.as_deref() {
            Some(report) if !state.review.trim().is_empty() => {
                progress("Merging review and report...".to_string());
                match writer.write_paper(&state.review, report).await {
                    Ok(paper) => Some(paper),
                    Err(e) => {
                        warning(format!("Final paper failed: {e}"));
                        None
                    }
                }
            }
            _ => None,
        };

        info!(
            rounds = state.round,
            results = state.all_results.len(),
            report = report.is_some(),
            "Pipeline complete"
        );
        Ok(state.into_outcome(report, final_document))
    }

    async fn dock(
        &self,
        stage: &DockingStage,
        targets: &[DockingTarget],
        round: u32,
        sink: &EventSink<PipelineEvent>,
    ) -> Result<DockingOutput> {
        let dock_sink = sink.map(move |event| PipelineEvent::Docking { round, event });
        settle(&dock_sink, stage.run(targets, round, &dock_sink)).await
    }
}
