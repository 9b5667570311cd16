use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::certification::rollup::StatSample;

/// Points awarded for a question that does not configure its own.
pub const DEFAULT_QUESTION_POINTS: u32 = 5;
pub const DEFAULT_PASSING_THRESHOLD: u32 = 70;

fn default_points() -> u32 {
    DEFAULT_QUESTION_POINTS
}

fn default_passing_threshold() -> u32 {
    DEFAULT_PASSING_THRESHOLD
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificationStatus {
    VoiceInterviewInProgress,
    Completed,
    Failed,
}

impl CertificationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Rubric tiers shown to the LLM when rating an answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoringCriteria {
    #[serde(default)]
    pub excellent: Option<String>,
    #[serde(default)]
    pub good: Option<String>,
    #[serde(default)]
    pub adequate: Option<String>,
    #[serde(default)]
    pub poor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificationQuestion {
    pub id: String,
    pub question: String,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default)]
    pub scoring_criteria: Option<ScoringCriteria>,
}

/// Per-dimension breakdown reported by the voice-interview rubric.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CompetencyScores {
    pub content_accuracy: f64,
    pub clarity: f64,
    pub engagement: f64,
    pub fluency: f64,
}

/// One scored answer. Never modified after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResponse {
    pub question_id: String,
    pub index: usize,
    pub response: String,
    pub score: u32,
    pub max_points: u32,
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    #[serde(default)]
    pub competency_scores: Option<CompetencyScores>,
    pub ai_score_used: bool,
    pub matched_keywords: usize,
    pub total_keywords: usize,
    pub answered_at: DateTime<Utc>,
}

impl StatSample for ScoredResponse {
    fn score(&self) -> f64 {
        self.score as f64
    }

    fn max_score(&self) -> f64 {
        self.max_points as f64
    }

    fn speaking_time(&self) -> Option<f64> {
        None
    }

    fn response_length(&self) -> usize {
        self.response.split_whitespace().count()
    }
}

/// The JSON blob attached to a certification attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificationSession {
    pub session_id: String,
    pub questions: Vec<CertificationQuestion>,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub responses: Vec<ScoredResponse>,
    #[serde(default = "default_passing_threshold")]
    pub passing_threshold: u32,
    #[serde(default)]
    pub overall_score: Option<u32>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_elapsed_secs: Option<u64>,
}

impl CertificationSession {
    pub fn new(questions: Vec<CertificationQuestion>, passing_threshold: u32) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            questions,
            current_question_index: 0,
            responses: Vec::new(),
            passing_threshold,
            overall_score: None,
            passed: None,
            completed_at: None,
            time_elapsed_secs: None,
        }
    }

    pub fn current_question(&self) -> Option<&CertificationQuestion> {
        self.questions.get(self.current_question_index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_question_index >= self.questions.len()
    }
}

/// A certification attempt as persisted in the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module_id: String,
    pub status: CertificationStatus,
    pub session: CertificationSession,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_defaults() {
        let q: CertificationQuestion =
            serde_json::from_value(json!({"id": "q1", "question": "Why?"})).unwrap();
        assert_eq!(q.points, DEFAULT_QUESTION_POINTS);
        assert!(q.expected_keywords.is_empty());
        assert!(q.scoring_criteria.is_none());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(CertificationStatus::VoiceInterviewInProgress).unwrap(),
            json!("VOICE_INTERVIEW_IN_PROGRESS")
        );
        assert!(CertificationStatus::Failed.is_terminal());
        assert!(!CertificationStatus::VoiceInterviewInProgress.is_terminal());
    }

    #[test]
    fn test_session_defaults_from_minimal_blob() {
        let session: CertificationSession = serde_json::from_value(json!({
            "session_id": "s1",
            "questions": [{"id": "q1", "question": "Explain lockout/tagout."}]
        }))
        .unwrap();
        assert_eq!(session.passing_threshold, DEFAULT_PASSING_THRESHOLD);
        assert_eq!(session.current_question_index, 0);
        assert_eq!(session.current_question().unwrap().id, "q1");
        assert!(!session.is_exhausted());
    }
}
