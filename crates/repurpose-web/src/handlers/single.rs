//! Single-response stages: reasoning, expansion, report, paper.

use axum::extract::State;
use axum::Json;
use repurpose_common::{DockingResult, DockingTarget, ExpansionRecord, ReasoningDecision};
use repurpose_orchestrator::{ExpansionRequest, ReasoningInput};
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub condition_name: String,
    #[serde(default)]
    pub all_results_so_far: Vec<DockingResult>,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub prior_hypotheses: Vec<String>,
    #[serde(default)]
    pub prior_actions: Vec<ExpansionRecord>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub decision: ReasoningDecision,
}

/// POST /api/analyze
pub async fn analyze(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let decision = state
        .oracles
        .reasoner()
        .decide(ReasoningInput {
            condition: &req.condition_name,
            results: &req.all_results_so_far,
            round: req.round,
            prior_hypotheses: &req.prior_hypotheses,
            prior_actions: &req.prior_actions,
        })
        .await?;
    Ok(Json(AnalyzeResponse { decision }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandRequest {
    pub decision: ReasoningDecision,
    #[serde(default)]
    pub protein_targets: Vec<String>,
    #[serde(default)]
    pub existing_docking_targets: Vec<DockingTarget>,
    #[serde(default)]
    pub all_results_so_far: Vec<DockingResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandResponse {
    pub new_docking_targets: Vec<DockingTarget>,
}

/// POST /api/expand
pub async fn expand(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ExpandRequest>,
) -> ApiResult<Json<ExpandResponse>> {
    let new_docking_targets = state
        .oracles
        .expander()
        .expand(ExpansionRequest {
            decision: &req.decision,
            proteins: &req.protein_targets,
            existing: &req.existing_docking_targets,
            results: &req.all_results_so_far,
        })
        .await?;
    Ok(Json(ExpandResponse { new_docking_targets }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub condition_name: String,
    #[serde(default)]
    pub all_results: Vec<DockingResult>,
    #[serde(default)]
    pub docking_targets: Vec<DockingTarget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub report_document: String,
}

/// POST /api/report
pub async fn report(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ReportRequest>,
) -> ApiResult<Json<ReportResponse>> {
    let report_document = state
        .oracles
        .report_writer()
        .write_report(&req.condition_name, &req.all_results, &req.docking_targets)
        .await?;
    Ok(Json(ReportResponse { report_document }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRequest {
    #[serde(default)]
    pub review_document: String,
    #[serde(default)]
    pub report_document: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperResponse {
    pub final_document: String,
}

/// POST /api/paper
pub async fn paper(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<PaperRequest>,
) -> ApiResult<Json<PaperResponse>> {
    let final_document = state
        .oracles
        .report_writer()
        .write_paper(&req.review_document, &req.report_document)
        .await?;
    Ok(Json(PaperResponse { final_document }))
}
