//! HTTP boundary: trigger, SSE progress stream, confirmation, health.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use apply_engine::{ApplyEngine, ApplyError, ApplyMode, ConfirmDecision, JobId, StreamItem};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    config: Config,
    engine: Arc<ApplyEngine>,
    started_at: chrono::DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, engine: Arc<ApplyEngine>) -> Self {
        Self {
            config,
            engine,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<ApplyEngine> {
        &self.engine
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/jobs/:job_id/apply", post(trigger_apply))
        .route("/v1/jobs/:job_id/apply/stream", get(stream_apply))
        .route("/v1/jobs/:job_id/apply/confirm", post(confirm_apply))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    mode: Option<ApplyMode>,
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    job_id: JobId,
    session_id: uuid::Uuid,
    mode: ApplyMode,
    created_at: chrono::DateTime<Utc>,
    stream_path: String,
}

async fn trigger_apply(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<TriggerRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::new(job_id);
    let mode = body
        .and_then(|Json(request)| request.mode)
        .unwrap_or(ApplyMode::SemiAuto);
    let receipt = state.engine.trigger(&job_id, mode)?;
    let response = TriggerResponse {
        stream_path: format!("/v1/jobs/{}/apply/stream", receipt.job_id),
        job_id: receipt.job_id,
        session_id: receipt.session_id,
        mode: receipt.mode,
        created_at: receipt.created_at,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn stream_apply(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let job_id = JobId::new(job_id);
    let stream = state.engine.open_stream(&job_id)?;
    let events = stream.map(|item| {
        Ok::<_, Infallible>(match item {
            StreamItem::Event(event) => {
                let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                SseEvent::default().event(event.event_type.wire_name()).data(data)
            }
            StreamItem::Heartbeat => SseEvent::default().comment("ping"),
        })
    });
    Ok(Sse::new(events))
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    decision: ConfirmDecision,
}

#[derive(Debug, Serialize)]
struct ConfirmResponse {
    job_id: JobId,
    decision: ConfirmDecision,
    /// False when a decision had already been recorded for this session.
    decided: bool,
}

async fn confirm_apply(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let job_id = JobId::new(job_id);
    let decided = state.engine.confirm(&job_id, request.decision)?;
    Ok(Json(ConfirmResponse {
        job_id,
        decision: request.decision,
        decided,
    }))
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "uptime_seconds": uptime,
        "active_sessions": state.engine.active_sessions(),
    }))
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<ApplyError> for ApiError {
    fn from(error: ApplyError) -> Self {
        match error {
            ApplyError::JobNotFound(_) | ApplyError::SessionNotFound(_) => {
                Self::NotFound(error.to_string())
            }
            ApplyError::AlreadyInProgress(_)
            | ApplyError::AlreadyApplied(_)
            | ApplyError::StreamAlreadyOpen(_) => Self::Conflict(error.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "not_found",
                    "message": message,
                })),
            )
                .into_response(),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "error": "conflict",
                    "message": message,
                })),
            )
                .into_response(),
            Self::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "internal",
                    "message": message,
                })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests;
