//! Certification progression: drives a fixed question list to a verdict.
//!
//! States: VOICE_INTERVIEW_IN_PROGRESS → COMPLETED | FAILED (terminal).
//! Every operation reloads the record, checks ownership and status, mutates
//! it, and writes it back with a version check.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::{self, AnalyticsSink};
use crate::certification::hybrid::HybridScorer;
use crate::certification::models::{
    CertificationQuestion, CertificationRecord, CertificationSession, CertificationStatus,
    ScoredResponse,
};
use crate::certification::progress::ProgressTracker;
use crate::certification::rollup::percentage;
use crate::errors::AppError;
use crate::store::{certification_key, SessionStore, StoreError};

const MAX_COMPLETION_ATTEMPTS: u32 = 3;
pub const MAX_QUESTION_POINTS: u32 = 100;
const SAVE_FAILED_WARNING: &str =
    "Your answer was scored but could not be saved. Please let your supervisor know if this keeps happening.";

// ────────────────────────────────────────────────────────────────────────────
// Request / response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub user_id: Uuid,
    pub module_id: String,
    pub questions: Vec<CertificationQuestion>,
    #[serde(default)]
    pub passing_threshold: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub question_id: Option<String>,
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub question_id: String,
    pub score: u32,
    pub max_points: u32,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub matched_keywords: usize,
    pub total_keywords: usize,
    pub ai_score_used: bool,
    pub current_question_index: usize,
    pub next_question: Option<CertificationQuestion>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub user_id: Uuid,
    /// Client-side copy of the responses. The stored list is authoritative;
    /// this is only compared against it for diagnostics.
    #[serde(default)]
    pub responses: Vec<Value>,
    /// Seconds the trainee spent in the interview.
    #[serde(default)]
    pub time_elapsed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub certification_id: Uuid,
    pub status: CertificationStatus,
    pub passed: bool,
    pub overall_score: u32,
    pub earned_points: u64,
    pub total_points: u64,
    pub passing_threshold: u32,
    pub completed_at: chrono::DateTime<Utc>,
    pub warning: Option<String>,
}

/// Pass/fail decision for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub earned_points: u64,
    pub total_points: u64,
    pub overall_score: u32,
    pub passed: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Operations
// ────────────────────────────────────────────────────────────────────────────

/// Starts a certification attempt with a fixed question list.
pub async fn start_certification(
    store: &dyn SessionStore,
    analytics_sink: &dyn AnalyticsSink,
    default_passing_threshold: u32,
    request: StartRequest,
) -> Result<CertificationRecord, AppError> {
    validate_start(&request)?;

    let passing_threshold = request
        .passing_threshold
        .unwrap_or(default_passing_threshold);
    let now = Utc::now();
    let record = CertificationRecord {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        module_id: request.module_id.trim().to_string(),
        status: CertificationStatus::VoiceInterviewInProgress,
        session: CertificationSession::new(request.questions, passing_threshold),
        created_at: now,
        updated_at: now,
    };

    store
        .write(&certification_key(&record.id), &to_blob(&record)?, None)
        .await?;

    info!(
        "Started certification {} for user {} on module {} ({} questions)",
        record.id,
        record.user_id,
        record.module_id,
        record.session.questions.len()
    );

    analytics::record(
        analytics_sink,
        analytics::SESSION_STARTED,
        json!({
            "certification_id": record.id,
            "user_id": record.user_id,
            "module_id": record.module_id,
            "question_count": record.session.questions.len(),
            "passing_threshold": passing_threshold,
        }),
    )
    .await;

    Ok(record)
}

/// Reads a certification record owned by `user_id`.
pub async fn get_certification(
    store: &dyn SessionStore,
    certification_id: Uuid,
    user_id: Uuid,
) -> Result<CertificationRecord, AppError> {
    let (record, _) = load_owned(store, certification_id, user_id).await?;
    Ok(record)
}

/// Scores an answer to the current question and advances the session.
///
/// A store failure other than a version conflict does not fail the request:
/// the score and next question are still returned with a warning attached.
pub async fn submit_answer(
    store: &dyn SessionStore,
    scorer: &HybridScorer,
    analytics_sink: &dyn AnalyticsSink,
    certification_id: Uuid,
    request: AnswerRequest,
) -> Result<AnswerOutcome, AppError> {
    if request.response.trim().is_empty() {
        return Err(AppError::Validation("response cannot be empty".to_string()));
    }

    let (mut record, version) = load_owned(store, certification_id, request.user_id).await?;
    ensure_in_progress(&record)?;

    if record.session.is_exhausted() {
        return Err(AppError::Validation(format!(
            "All {} questions of certification {certification_id} have been answered",
            record.session.questions.len()
        )));
    }

    let question = resolve_question(&record.session, request.question_id.as_deref())?.clone();
    let scored = scorer.score(&question, &request.response).await;

    let session = &mut record.session;
    session.responses.push(ScoredResponse {
        question_id: question.id.clone(),
        index: session.current_question_index,
        response: request.response.clone(),
        score: scored.score,
        max_points: scored.max_points,
        feedback: scored.feedback.clone(),
        strengths: scored.strengths.clone(),
        areas_for_improvement: scored.areas_for_improvement.clone(),
        competency_scores: None,
        ai_score_used: scored.ai_score_used,
        matched_keywords: scored.matched_keywords,
        total_keywords: scored.total_keywords,
        answered_at: Utc::now(),
    });
    session.current_question_index += 1;
    record.updated_at = Utc::now();

    let warning = match store
        .write(&certification_key(&certification_id), &to_blob(&record)?, Some(version))
        .await
    {
        Ok(_) => None,
        Err(e @ StoreError::Conflict { .. }) => {
            warn!("Answer for certification {certification_id} lost a concurrent write: {e}");
            return Err(AppError::Conflict(format!(
                "Certification {certification_id} was updated by another request; reload and retry"
            )));
        }
        Err(e) => {
            warn!("Failed to persist answer for certification {certification_id}: {e}");
            Some(SAVE_FAILED_WARNING.to_string())
        }
    };

    let feedback = match &warning {
        Some(w) => format!("{} (Warning: {w})", scored.feedback),
        None => scored.feedback.clone(),
    };

    info!(
        "Certification {certification_id}: question {} scored {}/{} (ai_score_used={})",
        question.id, scored.score, scored.max_points, scored.ai_score_used
    );

    analytics::record(
        analytics_sink,
        analytics::ANSWER_SCORED,
        json!({
            "certification_id": certification_id,
            "question_id": question.id,
            "score": scored.score,
            "max_points": scored.max_points,
            "ai_score_used": scored.ai_score_used,
            "question_index": record.session.current_question_index - 1,
            "persisted": warning.is_none(),
        }),
    )
    .await;

    Ok(AnswerOutcome {
        question_id: question.id,
        score: scored.score,
        max_points: scored.max_points,
        feedback,
        strengths: scored.strengths,
        areas_for_improvement: scored.areas_for_improvement,
        matched_keywords: scored.matched_keywords,
        total_keywords: scored.total_keywords,
        ai_score_used: scored.ai_score_used,
        current_question_index: record.session.current_question_index,
        next_question: record.session.current_question().cloned(),
        warning,
    })
}

/// Finalizes the attempt: recomputes the score, decides pass/fail, and
/// propagates a pass to training progress (best-effort).
pub async fn complete_certification(
    store: &dyn SessionStore,
    progress: &dyn ProgressTracker,
    analytics_sink: &dyn AnalyticsSink,
    certification_id: Uuid,
    request: CompleteRequest,
) -> Result<CompletionOutcome, AppError> {
    let mut attempt = 0;
    let (record, verdict, warning) = loop {
        attempt += 1;
        let (mut record, version) = load_owned(store, certification_id, request.user_id).await?;
        ensure_in_progress(&record)?;

        if !request.responses.is_empty() && request.responses.len() != record.session.responses.len()
        {
            warn!(
                "Certification {certification_id}: client reported {} responses, {} stored",
                request.responses.len(),
                record.session.responses.len()
            );
        }

        let verdict = compute_verdict(&record.session);
        let now = Utc::now();
        record.status = if verdict.passed {
            CertificationStatus::Completed
        } else {
            CertificationStatus::Failed
        };
        record.session.overall_score = Some(verdict.overall_score);
        record.session.passed = Some(verdict.passed);
        record.session.completed_at = Some(now);
        record.session.time_elapsed_secs = request.time_elapsed;
        record.updated_at = now;

        match store
            .write(&certification_key(&certification_id), &to_blob(&record)?, Some(version))
            .await
        {
            Ok(_) => break (record, verdict, None),
            Err(StoreError::Conflict { .. }) if attempt < MAX_COMPLETION_ATTEMPTS => {
                warn!("Certification {certification_id} changed during completion; retrying");
            }
            Err(e @ StoreError::Conflict { .. }) => return Err(e.into()),
            Err(e) => {
                warn!("Failed to persist completion of certification {certification_id}: {e}");
                break (
                    record,
                    verdict,
                    Some("Your result was calculated but could not be saved.".to_string()),
                );
            }
        }
    };

    info!(
        "Certification {certification_id} finished: {}% (threshold {}%) passed={}",
        verdict.overall_score, record.session.passing_threshold, verdict.passed
    );

    if verdict.passed {
        if let Err(e) = progress
            .mark_certified(record.user_id, &record.module_id)
            .await
        {
            warn!(
                "Could not mark module {} certified for user {}: {e:#}",
                record.module_id, record.user_id
            );
        }
    }

    analytics::record(
        analytics_sink,
        analytics::SESSION_COMPLETED,
        json!({
            "certification_id": certification_id,
            "user_id": record.user_id,
            "module_id": record.module_id,
            "overall_score": verdict.overall_score,
            "passed": verdict.passed,
            "responses": record.session.responses.len(),
            "time_elapsed": request.time_elapsed,
        }),
    )
    .await;

    Ok(CompletionOutcome {
        certification_id,
        status: record.status,
        passed: verdict.passed,
        overall_score: verdict.overall_score,
        earned_points: verdict.earned_points,
        total_points: verdict.total_points,
        passing_threshold: record.session.passing_threshold,
        completed_at: record.updated_at,
        warning,
    })
}

/// `overall_score = round(100 × earned / total)` where `total` sums the points
/// of every question (at least 1 each) and `earned` sums the recorded scores.
pub fn compute_verdict(session: &CertificationSession) -> Verdict {
    let earned_points: u64 = session.responses.iter().map(|r| u64::from(r.score)).sum();
    let total_points: u64 = session
        .questions
        .iter()
        .map(|q| u64::from(q.points.max(1)))
        .sum();

    let overall_score = percentage(earned_points as f64, total_points as f64);
    Verdict {
        earned_points,
        total_points,
        overall_score,
        passed: overall_score >= session.passing_threshold,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Answers always target the question at the current position. A supplied id
/// must name that question; an id that matches no question is ignored.
fn resolve_question<'a>(
    session: &'a CertificationSession,
    question_id: Option<&str>,
) -> Result<&'a CertificationQuestion, AppError> {
    let current = session
        .current_question()
        .ok_or_else(|| AppError::Validation("No current question".to_string()))?;

    let answered = |id: &str| session.responses.iter().any(|r| r.question_id == id);

    if let Some(id) = question_id.filter(|id| *id != current.id) {
        if answered(id) {
            return Err(AppError::Validation(format!(
                "Question {id} has already been answered"
            )));
        }
        if session.questions.iter().any(|q| q.id == id) {
            return Err(AppError::Validation(format!(
                "Question {id} is out of order; the current question is {}",
                current.id
            )));
        }
        warn!("Question id {id} not found; answering current question {}", current.id);
    }

    if answered(current.id.as_str()) {
        return Err(AppError::Validation(format!(
            "Question {} has already been answered",
            current.id
        )));
    }
    Ok(current)
}

fn validate_start(request: &StartRequest) -> Result<(), AppError> {
    if request.module_id.trim().is_empty() {
        return Err(AppError::Validation("module_id cannot be empty".to_string()));
    }
    if request.questions.is_empty() {
        return Err(AppError::Validation(
            "A certification needs at least one question".to_string(),
        ));
    }
    if let Some(t) = request.passing_threshold {
        if t > 100 {
            return Err(AppError::Validation(
                "passing_threshold must be between 0 and 100".to_string(),
            ));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for q in &request.questions {
        if q.id.trim().is_empty() || q.question.trim().is_empty() {
            return Err(AppError::Validation(
                "Every question needs an id and text".to_string(),
            ));
        }
        if !(1..=MAX_QUESTION_POINTS).contains(&q.points) {
            return Err(AppError::Validation(format!(
                "Question {} must be worth between 1 and {MAX_QUESTION_POINTS} points",
                q.id
            )));
        }
        if !seen.insert(q.id.as_str()) {
            return Err(AppError::Validation(format!("Duplicate question id {}", q.id)));
        }
    }
    Ok(())
}

async fn load_owned(
    store: &dyn SessionStore,
    certification_id: Uuid,
    user_id: Uuid,
) -> Result<(CertificationRecord, i64), AppError> {
    let key = certification_key(&certification_id);
    let blob = store
        .read(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Certification {certification_id} not found")))?;

    let record: CertificationRecord = serde_json::from_value(blob.value).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Corrupt certification record {key}: {e}"))
    })?;

    if record.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok((record, blob.version))
}

fn ensure_in_progress(record: &CertificationRecord) -> Result<(), AppError> {
    if record.status.is_terminal() {
        return Err(AppError::InvalidStatus(format!(
            "Certification {} is {:?}, not in a voice interview",
            record.id, record.status
        )));
    }
    Ok(())
}

fn to_blob(record: &CertificationRecord) -> Result<Value, AppError> {
    serde_json::to_value(record)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize certification: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
