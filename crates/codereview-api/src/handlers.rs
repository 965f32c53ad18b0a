use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use chrono::{DateTime, Utc};
use codereview_core::{
    AnalysisRequest, AnalysisResult, HistoryPage, HistoryQuery, StoredAnalysis, AGENT_VERSION,
    DEFAULT_HISTORY_LIMIT,
};
use codereview_pipeline::InferenceStatus;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::{metrics, ApiError, ApiResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub agent_version: String,
    pub history_persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub as_of: Option<i64>,
}

impl From<HistoryParams> for HistoryQuery {
    fn from(params: HistoryParams) -> Self {
        HistoryQuery {
            limit: params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            offset: params.offset.unwrap_or(0),
            as_of: params.as_of,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub generator: String,
    pub history_backend: &'static str,
    pub total_analyses: u64,
    pub average_processing_time_ms: f64,
    pub last_analysis: Option<DateTime<Utc>>,
    pub inference: InferenceStatus,
}

pub async fn analyze_code(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Json<AnalysisResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        metrics::record_failure("validation");
        ApiError::BadRequest(rejection.body_text())
    })?;

    let start = Instant::now();
    let outcome = match state.pipeline.analyze(&request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            metrics::record_failure(err.kind());
            return Err(err.into());
        }
    };

    let history_persisted = outcome.history_persisted();
    metrics::record_success(start.elapsed().as_secs_f64(), history_persisted);

    Ok(Json(AnalysisResponse {
        result: outcome.result,
        agent_version: AGENT_VERSION.to_string(),
        history_persisted,
        history_error: outcome.history.err().map(|e| e.to_string()),
    }))
}

pub async fn analysis_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<HistoryPage>> {
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let query = HistoryQuery::from(params);
    query.validate()?;

    let page = state.pipeline.history().list(query).await.map_err(|e| {
        warn!(error = %e, "Failed to list analysis history");
        ApiError::from(e)
    })?;
    Ok(Json(page))
}

pub async fn analysis_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredAnalysis>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid analysis id: {}", id)))?;

    let stored = state.pipeline.history().get(id).await?;

    stored
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Analysis {} not found", id)))
}

pub async fn agent_status(State(state): State<AppState>) -> ApiResult<Json<AgentStatus>> {
    let pipeline = &state.pipeline;
    let stats = pipeline.history().stats().await?;

    Ok(Json(AgentStatus {
        name: "code-review-agent",
        version: AGENT_VERSION,
        uptime_seconds: state.uptime_seconds(),
        generator: pipeline.generator().name().to_string(),
        history_backend: pipeline.history().backend(),
        total_analyses: stats.total_analyses,
        average_processing_time_ms: stats.average_processing_time_ms,
        last_analysis: stats.last_analysis,
        inference: pipeline.inference_health().snapshot(),
    }))
}
