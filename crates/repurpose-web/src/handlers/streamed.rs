//! Streamed stages. Input is validated up front so a bad request gets a
//! plain 400 instead of a one-event stream.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_core::Stream;
use repurpose_common::error::require_non_empty;
use repurpose_common::events::{DiscoveryEvent, DockEvent, StructureEvent};
use repurpose_common::{CandidateDrug, DockingTarget, RepurposeError};
use repurpose_orchestrator::{Pipeline, PipelineEvent};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiJson, ApiResult};
use crate::sse::stream_stage;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRequest {
    #[serde(default)]
    pub condition_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuresRequest {
    #[serde(default)]
    pub protein_targets: Vec<String>,
    #[serde(default)]
    pub candidate_drugs: Vec<CandidateDrug>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockRequest {
    #[serde(default)]
    pub docking_targets: Vec<DockingTarget>,
    #[serde(default = "first_round")]
    pub round: u32,
}

fn first_round() -> u32 {
    1
}

/// POST /api/review
pub async fn review(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ConditionRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_non_empty("conditionName", &req.condition_name)?;
    info!(condition = %req.condition_name, "Discovery requested");

    let stage = state.oracles.discovery(state.options.max_papers);
    Ok(stream_stage::<DiscoveryEvent, _, _>(move |sink| async move {
        stage.run(&req.condition_name, &sink).await
    }))
}

/// POST /api/structures
pub async fn structures(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<StructuresRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if req.protein_targets.iter().all(|p| p.trim().is_empty()) {
        return Err(RepurposeError::InvalidInput("proteinTargets is required".into()).into());
    }

    let stage = state.oracles.structure_stage();
    Ok(stream_stage::<StructureEvent, _, _>(move |sink| async move {
        stage.run(&req.protein_targets, &req.candidate_drugs, &sink).await
    }))
}

/// POST /api/dock
pub async fn dock(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<DockRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if req.docking_targets.is_empty() {
        return Err(RepurposeError::InvalidInput("dockingTargets is required".into()).into());
    }
    if req.round == 0 {
        return Err(RepurposeError::InvalidInput("round starts at 1".into()).into());
    }

    let stage = state.oracles.docking_stage(state.options.docking.clone());
    Ok(stream_stage::<DockEvent, _, _>(move |sink| async move {
        stage.run(&req.docking_targets, req.round, &sink).await
    }))
}

/// POST /api/pipeline: the whole run, every stage's events in one stream.
pub async fn pipeline(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ConditionRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_non_empty("conditionName", &req.condition_name)?;
    info!(condition = %req.condition_name, "Full pipeline requested");

    let pipeline = Pipeline::new(state.oracles.clone()).with_options(state.options.clone());
    Ok(stream_stage::<PipelineEvent, _, _>(move |sink| async move {
        pipeline.run(&req.condition_name, &sink).await
    }))
}
