//! Q&A over a run's results.

use axum::extract::State;
use axum::Json;
use repurpose_orchestrator::{answer, ChatContext};
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub context: ChatContext,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// POST /api/chat
pub async fn chat(State(state): State<SharedState>, ApiJson(req): ApiJson<ChatRequest>) -> ApiResult<Json<ChatResponse>> {
    let reply = answer(state.oracles.llm.as_ref(), &req.question, &req.context).await?;
    Ok(Json(ChatResponse { answer: reply }))
}
