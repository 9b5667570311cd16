use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::AgentResolution;
use crate::certification::enhanced::{
    get_interview_session, score_interview_response, InterviewSession, ScoreOutcome, ScoreRequest,
};
use crate::certification::models::CertificationRecord;
use crate::certification::progression::{
    complete_certification, get_certification, start_certification, submit_answer, AnswerOutcome,
    AnswerRequest, CompleteRequest, CompletionOutcome, StartRequest,
};
use crate::certification::rollup::ResponseStats;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct ResolveQuery {
    pub module_id: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Serialize)]
pub struct CertificationView {
    #[serde(flatten)]
    pub record: CertificationRecord,
    pub stats: ResponseStats,
}

/// POST /api/v1/certifications
pub async fn handle_start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<CertificationRecord>), AppError> {
    let record = start_certification(
        state.store.as_ref(),
        state.analytics.as_ref(),
        state.config.default_passing_threshold,
        req,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/certifications/:id
pub async fn handle_get_certification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<CertificationView>, AppError> {
    let record = get_certification(state.store.as_ref(), id, params.user_id).await?;
    let stats = ResponseStats::from_samples(&record.session.responses);
    Ok(Json(CertificationView { record, stats }))
}

/// POST /api/v1/certifications/:id/answers
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerOutcome>, AppError> {
    let outcome = submit_answer(
        state.store.as_ref(),
        &state.hybrid,
        state.analytics.as_ref(),
        id,
        req,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/certifications/:id/complete
pub async fn handle_complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompletionOutcome>, AppError> {
    let outcome = complete_certification(
        state.store.as_ref(),
        state.progress.as_ref(),
        state.analytics.as_ref(),
        id,
        req,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/score
pub async fn handle_score(
    State(state): State<AppState>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreOutcome>, AppError> {
    let outcome = score_interview_response(
        state.store.as_ref(),
        &state.enhanced,
        state.analytics.as_ref(),
        req,
    )
    .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/interviews/:session_id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<InterviewSession>, AppError> {
    let session = get_interview_session(state.store.as_ref(), &session_id).await?;
    Ok(Json(session))
}

/// GET /api/v1/agents/resolve
pub async fn handle_resolve_agent(
    State(state): State<AppState>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<AgentResolution>, AppError> {
    if params.module_id.trim().is_empty() {
        return Err(AppError::Validation("module_id cannot be empty".to_string()));
    }
    Ok(Json(
        state
            .agents
            .resolve(params.module_id.trim(), params.topic.as_deref()),
    ))
}
