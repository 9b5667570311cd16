//! Enhanced scoring: LLM-rubric-only scoring of spoken interview answers.
//!
//! Flow: load interview session → score answer (LLM, heuristic fallback) →
//!       append response → recompute overall score and rollup → persist with
//!       a version check → tell the caller whether to keep asking.
//!
//! Delivery metrics only inform the prompt. They feed the score directly only
//! on the heuristic fallback path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::analytics::{self, AnalyticsSink};
use crate::certification::decode::{
    decode_interview_verdict, proportional_competencies, INTERVIEW_MAX_SCORE,
};
use crate::certification::models::CompetencyScores;
use crate::certification::prompts::{INTERVIEW_SCORING_PROMPT, INTERVIEW_SCORING_SYSTEM};
use crate::certification::rollup::{overall_percentage, ResponseStats, StatSample};
use crate::errors::AppError;
use crate::llm_client::{CompletionModel, CompletionOptions};
use crate::store::{interview_key, SessionStore, StoreError};

/// Stop asking once this many responses are recorded.
pub const MAX_INTERVIEW_RESPONSES: usize = 8;
/// Stop asking once the running score reaches this percentage.
pub const EARLY_EXIT_SCORE: u32 = 90;
const HISTORY_TURNS: usize = 3;
const MAX_WRITE_ATTEMPTS: u32 = 3;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryMetrics {
    /// Seconds the candidate spoke for.
    #[serde(default)]
    pub speaking_time: Option<f64>,
    /// Word count of the transcript. Computed from the answer when absent.
    #[serde(default)]
    pub response_length: Option<usize>,
    /// Transcription confidence, 0.0 – 1.0. Values above 1 are read as percentages.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl DeliveryMetrics {
    fn confidence_fraction(&self) -> Option<f64> {
        self.confidence
            .map(|c| if c > 1.0 { c / 100.0 } else { c })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Everything the scorer needs for one spoken answer.
#[derive(Debug, Clone)]
pub struct InterviewAnswer<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub history: &'a [ConversationTurn],
    pub module_title: &'a str,
    pub metrics: &'a DeliveryMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterviewScore {
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    pub competency_scores: CompetencyScores,
    pub next_question_suggestion: Option<String>,
    pub ai_score_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterviewResponse {
    pub question: String,
    pub answer: String,
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    pub competency_scores: CompetencyScores,
    pub metrics: DeliveryMetrics,
    pub ai_score_used: bool,
    pub answered_at: DateTime<Utc>,
}

impl StatSample for InterviewResponse {
    fn score(&self) -> f64 {
        self.score
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn speaking_time(&self) -> Option<f64> {
        self.metrics.speaking_time
    }

    fn response_length(&self) -> usize {
        self.metrics
            .response_length
            .unwrap_or_else(|| word_count(&self.answer))
    }
}

/// Interview session blob, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterviewSession {
    pub session_id: String,
    #[serde(default)]
    pub module_title: Option<String>,
    #[serde(default)]
    pub responses: Vec<InterviewResponse>,
    #[serde(default)]
    pub overall_score: u32,
    #[serde(default)]
    pub analytics: ResponseStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(session_id: &str, module_title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            module_title,
            responses: Vec::new(),
            overall_score: 0,
            analytics: ResponseStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a response and recomputes every derived field from the full list.
    pub fn append(&mut self, response: InterviewResponse) {
        self.responses.push(response);
        self.overall_score = overall_percentage(&self.responses);
        self.analytics = ResponseStats::from_samples(&self.responses);
        self.updated_at = Utc::now();
    }

    pub fn should_continue(&self) -> bool {
        should_continue(self.responses.len(), self.overall_score)
    }

    /// The last few question/answer pairs, oldest first.
    fn recent_turns(&self) -> Vec<ConversationTurn> {
        let mut turns: Vec<ConversationTurn> = self
            .responses
            .iter()
            .flat_map(|r| {
                [
                    ConversationTurn {
                        role: "assistant".to_string(),
                        content: r.question.clone(),
                    },
                    ConversationTurn {
                        role: "user".to_string(),
                        content: r.answer.clone(),
                    },
                ]
            })
            .collect();
        let skip = turns.len().saturating_sub(HISTORY_TURNS);
        turns.drain(..skip);
        turns
    }
}

pub fn should_continue(responses: usize, overall_score: u32) -> bool {
    responses < MAX_INTERVIEW_RESPONSES && overall_score < EARLY_EXIT_SCORE
}

// ────────────────────────────────────────────────────────────────────────────
// Scorer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EnhancedScorer {
    llm: Arc<dyn CompletionModel>,
}

impl EnhancedScorer {
    pub fn new(llm: Arc<dyn CompletionModel>) -> Self {
        Self { llm }
    }

    /// Scores one answer. Never fails; any LLM problem yields the heuristic score.
    pub async fn score(&self, input: &InterviewAnswer<'_>) -> InterviewScore {
        let prompt = build_interview_prompt(input);
        let options = CompletionOptions {
            temperature: 0.3,
            max_tokens: 800,
            json_mode: true,
        };

        match self
            .llm
            .complete(INTERVIEW_SCORING_SYSTEM, &prompt, options)
            .await
        {
            Ok(text) => match decode_interview_verdict(&text) {
                Some(v) => InterviewScore {
                    score: v.score,
                    max_score: v.max_score,
                    feedback: v.feedback,
                    competency_scores: v.competency_scores,
                    next_question_suggestion: v.next_question_suggestion,
                    ai_score_used: true,
                },
                None => {
                    warn!("Interview scoring returned unparseable output; using heuristic score");
                    heuristic_score(input.answer, input.metrics)
                }
            },
            Err(e) => {
                warn!("Interview scoring failed: {e}; using heuristic score");
                heuristic_score(input.answer, input.metrics)
            }
        }
    }
}

/// Word-count heuristic used when the LLM is unavailable.
///
/// base = min(10, max(3, floor(words / 8) + 3)), +1 for a speaking time in
/// (5, 60) seconds, +1 for confidence above 0.7, capped at 10.
pub fn heuristic_score(answer: &str, metrics: &DeliveryMetrics) -> InterviewScore {
    let words = word_count(answer) as u32;
    let mut total = (words / 8 + 3).clamp(3, 10);

    if metrics
        .speaking_time
        .is_some_and(|t| t > 5.0 && t < 60.0)
    {
        total += 1;
    }
    if metrics.confidence_fraction().is_some_and(|c| c > 0.7) {
        total += 1;
    }
    let total = total.min(INTERVIEW_MAX_SCORE as u32) as f64;

    InterviewScore {
        score: total,
        max_score: INTERVIEW_MAX_SCORE,
        feedback: fallback_feedback(total).to_string(),
        competency_scores: proportional_competencies(total),
        next_question_suggestion: None,
        ai_score_used: false,
    }
}

fn fallback_feedback(total: f64) -> &'static str {
    if total >= 8.0 {
        "Thank you for a detailed answer. Your explanation covered the topic well."
    } else if total >= 5.0 {
        "Thank you for your answer. Try to add more specific steps and examples."
    } else {
        "Thank you for your answer. Please expand on the key points in more detail."
    }
}

fn build_interview_prompt(input: &InterviewAnswer<'_>) -> String {
    let skip = input.history.len().saturating_sub(HISTORY_TURNS);
    let history = input.history[skip..]
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n");
    let history = if history.is_empty() {
        "(start of interview)".to_string()
    } else {
        history
    };

    let response_length = input
        .metrics
        .response_length
        .unwrap_or_else(|| word_count(input.answer));

    INTERVIEW_SCORING_PROMPT
        .replace("{module_title}", input.module_title)
        .replace("{history}", &history)
        .replace("{question}", input.question)
        .replace("{answer}", input.answer.trim())
        .replace(
            "{speaking_time}",
            &input
                .metrics
                .speaking_time
                .map(|t| format!("{t:.0}"))
                .unwrap_or_else(|| "unknown".to_string()),
        )
        .replace("{response_length}", &response_length.to_string())
        .replace(
            "{confidence}",
            &input
                .metrics
                .confidence_fraction()
                .map(|c| format!("{:.0}%", c * 100.0))
                .unwrap_or_else(|| "unknown".to_string()),
        )
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ────────────────────────────────────────────────────────────────────────────
// Session service
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreRequest {
    pub session_id: String,
    pub question: String,
    pub response: String,
    #[serde(default)]
    pub conversation_history: Option<Vec<ConversationTurn>>,
    #[serde(default)]
    pub metrics: Option<DeliveryMetrics>,
    #[serde(default)]
    pub module_title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    pub competency_scores: CompetencyScores,
    pub next_question_suggestion: Option<String>,
    pub ai_score_used: bool,
    pub overall_score: u32,
    pub total_responses: usize,
    pub should_continue: bool,
    /// Set when the response was scored but could not be saved.
    pub warning: Option<String>,
}

/// Scores an interview answer and appends it to the session.
///
/// Appends commute, so a version conflict reloads the session and re-appends
/// the already scored response instead of failing.
pub async fn score_interview_response(
    store: &dyn SessionStore,
    scorer: &EnhancedScorer,
    analytics_sink: &dyn AnalyticsSink,
    request: ScoreRequest,
) -> Result<ScoreOutcome, AppError> {
    if request.session_id.trim().is_empty() {
        return Err(AppError::Validation("session_id cannot be empty".to_string()));
    }
    if request.question.trim().is_empty() {
        return Err(AppError::Validation("question cannot be empty".to_string()));
    }

    let key = interview_key(&request.session_id);
    let (mut session, mut version) = load_interview(store, &key, &request).await?;

    let metrics = request.metrics.clone().unwrap_or_default();
    let history = request
        .conversation_history
        .clone()
        .unwrap_or_else(|| session.recent_turns());
    let module_title = request
        .module_title
        .clone()
        .or_else(|| session.module_title.clone())
        .unwrap_or_else(|| "General training".to_string());

    let scored = scorer
        .score(&InterviewAnswer {
            question: &request.question,
            answer: &request.response,
            history: &history,
            module_title: &module_title,
            metrics: &metrics,
        })
        .await;

    let response = InterviewResponse {
        question: request.question.clone(),
        answer: request.response.clone(),
        score: scored.score,
        max_score: scored.max_score,
        feedback: scored.feedback.clone(),
        competency_scores: scored.competency_scores,
        metrics,
        ai_score_used: scored.ai_score_used,
        answered_at: Utc::now(),
    };

    let mut warning = None;
    let mut attempt = 0;
    loop {
        attempt += 1;
        session.append(response.clone());
        let value = serde_json::to_value(&session)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize session: {e}")))?;

        match store.write(&key, &value, version).await {
            Ok(_) => break,
            Err(StoreError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(
                    "Interview session {} changed concurrently; reloading (attempt {attempt})",
                    request.session_id
                );
                (session, version) = load_interview(store, &key, &request).await?;
            }
            Err(e @ StoreError::Conflict { .. }) => return Err(e.into()),
            Err(e) => {
                warn!(
                    "Failed to persist interview response for session {}: {e}",
                    request.session_id
                );
                warning = Some(
                    "Your response was scored but could not be saved. Please try again."
                        .to_string(),
                );
                break;
            }
        }
    }

    info!(
        "Interview session {}: response {} scored {}/{} (overall {}%)",
        request.session_id,
        session.responses.len(),
        scored.score,
        scored.max_score,
        session.overall_score
    );

    analytics::record(
        analytics_sink,
        analytics::INTERVIEW_RESPONSE_SCORED,
        json!({
            "session_id": request.session_id,
            "score": scored.score,
            "max_score": scored.max_score,
            "ai_score_used": scored.ai_score_used,
            "overall_score": session.overall_score,
            "total_responses": session.responses.len(),
            "persisted": warning.is_none(),
        }),
    )
    .await;

    let feedback = match &warning {
        Some(w) => format!("{} (Warning: {w})", scored.feedback),
        None => scored.feedback,
    };

    Ok(ScoreOutcome {
        score: scored.score,
        max_score: scored.max_score,
        feedback,
        competency_scores: scored.competency_scores,
        next_question_suggestion: scored.next_question_suggestion,
        ai_score_used: scored.ai_score_used,
        overall_score: session.overall_score,
        total_responses: session.responses.len(),
        should_continue: session.should_continue(),
        warning,
    })
}

/// Reads the interview session, or starts a fresh one if none is stored.
/// The returned version is `None` for a session that has never been written.
async fn load_interview(
    store: &dyn SessionStore,
    key: &str,
    request: &ScoreRequest,
) -> Result<(InterviewSession, Option<i64>), AppError> {
    match store.read(key).await? {
        Some(blob) => {
            let session: InterviewSession = serde_json::from_value(blob.value).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Corrupt interview session {key}: {e}"))
            })?;
            Ok((session, Some(blob.version)))
        }
        None => Ok((
            InterviewSession::new(&request.session_id, request.module_title.clone()),
            None,
        )),
    }
}

/// Reads a stored interview session for display.
pub async fn get_interview_session(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<InterviewSession, AppError> {
    let key = interview_key(session_id);
    let blob = store
        .read(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview session {session_id} not found")))?;
    serde_json::from_value(blob.value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt interview session {key}: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
