//! Tolerant decoding of structured LLM output.
//!
//! The model is asked for JSON but may wrap it in prose, use camelCase or
//! snake_case keys, quote numbers, or drop fields. Each decoder maps whatever
//! came back onto a fully populated verdict with safe defaults. A reply that
//! contains no JSON object at all decodes to `None`, which callers treat the
//! same as a failed call.

use serde_json::{Map, Value};

use crate::certification::models::CompetencyScores;
use crate::llm_client::extract_json_object;

pub const DEFAULT_FEEDBACK: &str = "Your response has been evaluated.";
pub const INTERVIEW_MAX_SCORE: f64 = 10.0;

/// Share of the interview total attributed to each rubric dimension.
pub const COMPETENCY_WEIGHTS: CompetencyScores = CompetencyScores {
    content_accuracy: 0.4,
    clarity: 0.3,
    engagement: 0.2,
    fluency: 0.1,
};

/// Decoded hybrid-scorer rating. `score` is already clamped to `[1, points]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricVerdict {
    pub score: u32,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
}

/// Decoded voice-interview rating. `score` is clamped to `[0, max_score]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewVerdict {
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    pub competency_scores: CompetencyScores,
    pub next_question_suggestion: Option<String>,
}

pub fn decode_rubric_verdict(text: &str, points: u32) -> Option<RubricVerdict> {
    let obj = parse_object(text)?;
    let points = points.max(1);

    let score = number_field(&obj, &["score", "rating"])
        .map(|s| s.round().clamp(1.0, points as f64) as u32)
        .unwrap_or_else(|| points.div_ceil(2));

    Some(RubricVerdict {
        score,
        feedback: string_field(&obj, &["feedback"]).unwrap_or_else(|| DEFAULT_FEEDBACK.to_string()),
        strengths: string_list(&obj, &["strengths"]),
        areas_for_improvement: string_list(
            &obj,
            &["areas_for_improvement", "areasForImprovement", "improvements"],
        ),
    })
}

pub fn decode_interview_verdict(text: &str) -> Option<InterviewVerdict> {
    let obj = parse_object(text)?;

    let max_score = number_field(&obj, &["maxScore", "max_score"])
        .filter(|m| *m > 0.0)
        .unwrap_or(INTERVIEW_MAX_SCORE);
    let score = number_field(&obj, &["score"])
        .unwrap_or(max_score / 2.0)
        .clamp(0.0, max_score);

    let fallback = proportional_competencies(score);
    let competency_scores = match object_field(&obj, &["competencyScores", "competency_scores"]) {
        Some(c) => CompetencyScores {
            content_accuracy: number_field(c, &["contentAccuracy", "content_accuracy"])
                .map(|v| v.clamp(0.0, 4.0))
                .unwrap_or(fallback.content_accuracy),
            clarity: number_field(c, &["clarity"])
                .map(|v| v.clamp(0.0, 3.0))
                .unwrap_or(fallback.clarity),
            engagement: number_field(c, &["engagement"])
                .map(|v| v.clamp(0.0, 2.0))
                .unwrap_or(fallback.engagement),
            fluency: number_field(c, &["fluency"])
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(fallback.fluency),
        },
        None => fallback,
    };

    Some(InterviewVerdict {
        score,
        max_score,
        feedback: string_field(&obj, &["feedback"]).unwrap_or_else(|| DEFAULT_FEEDBACK.to_string()),
        competency_scores,
        next_question_suggestion: string_field(
            &obj,
            &["nextQuestionSuggestion", "next_question_suggestion"],
        ),
    })
}

/// 40/30/20/10 slices of `total`, each rounded on its own.
/// The slices are not renormalised, so they need not sum to `total`.
pub fn proportional_competencies(total: f64) -> CompetencyScores {
    CompetencyScores {
        content_accuracy: (total * COMPETENCY_WEIGHTS.content_accuracy).round(),
        clarity: (total * COMPETENCY_WEIGHTS.clarity).round(),
        engagement: (total * COMPETENCY_WEIGHTS.engagement).round(),
        fluency: (total * COMPETENCY_WEIGHTS.fluency).round(),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let json = extract_json_object(text)?;
    match serde_json::from_str::<Value>(json).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn object_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    lookup(obj, keys).and_then(Value::as_object)
}

/// Accepts JSON numbers and numeric strings such as `"7"` or `" 3.5 "`.
fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    let n = match lookup(obj, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(obj, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    match lookup(obj, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
