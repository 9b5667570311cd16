//! Hybrid keyword + LLM scorer for a single certification answer.
//!
//! Algorithm:
//! 1. Deterministic keyword score (always runs):
//!    - keyword_percentage = matched / total expected keywords (0.7 when none are defined)
//!    - length_factor      = min(chars / 100, 1.0)
//!    - keyword_score      = ceil(points × (0.7 × keyword_percentage + 0.3 × length_factor))
//! 2. LLM rubric score (skipped for answers of 15 chars or fewer, or when the call fails).
//! 3. final = round(0.4 × keyword_score + 0.6 × ai_score) when the LLM answered,
//!    otherwise keyword_score; always clamped to [1, points].
//!
//! `HybridScorer::score` never fails. LLM errors degrade to the keyword path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::certification::decode::{decode_rubric_verdict, RubricVerdict};
use crate::certification::models::{CertificationQuestion, ScoringCriteria};
use crate::certification::prompts::{RUBRIC_SCORING_PROMPT, RUBRIC_SCORING_SYSTEM};
use crate::llm_client::{CompletionModel, CompletionOptions};

/// Answers this short (in characters) are never sent to the LLM.
pub const AI_MIN_ANSWER_CHARS: usize = 15;
const NO_KEYWORDS_PERCENTAGE: f64 = 0.7;
const KEYWORD_COVERAGE_WEIGHT: f64 = 0.7;
const LENGTH_WEIGHT: f64 = 0.3;
const FULL_LENGTH_CHARS: f64 = 100.0;
const KEYWORD_BLEND_WEIGHT: f64 = 0.4;
const AI_BLEND_WEIGHT: f64 = 0.6;

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

/// Result of the deterministic keyword pass.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordAssessment {
    pub matched_keywords: usize,
    pub total_keywords: usize,
    pub keyword_percentage: f64, // 0.0 – 1.0
    pub length_factor: f64,      // 0.0 – 1.0
    pub keyword_score: u32,      // 1 – points
}

/// Final score for one answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerScore {
    pub score: u32,
    pub max_points: u32,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub matched_keywords: usize,
    pub total_keywords: usize,
    pub keyword_score: u32,
    pub ai_score: Option<u32>,
    pub ai_score_used: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Scorer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HybridScorer {
    llm: Arc<dyn CompletionModel>,
}

impl HybridScorer {
    pub fn new(llm: Arc<dyn CompletionModel>) -> Self {
        Self { llm }
    }

    pub async fn score(&self, question: &CertificationQuestion, answer: &str) -> AnswerScore {
        let points = question.points.max(1);
        let keywords = assess_keywords(question, answer);

        let verdict = if answer_chars(answer) > AI_MIN_ANSWER_CHARS {
            self.rate_with_llm(question, answer).await
        } else {
            debug!(
                "Answer to {} too short for AI scoring; using keyword score",
                question.id
            );
            None
        };

        combine(points, keywords, verdict)
    }

    async fn rate_with_llm(
        &self,
        question: &CertificationQuestion,
        answer: &str,
    ) -> Option<RubricVerdict> {
        let prompt = build_rubric_prompt(question, answer);
        let options = CompletionOptions {
            temperature: 0.3,
            max_tokens: 500,
            json_mode: true,
        };

        match self.llm.complete(RUBRIC_SCORING_SYSTEM, &prompt, options).await {
            Ok(text) => {
                let verdict = decode_rubric_verdict(&text, question.points);
                if verdict.is_none() {
                    warn!(
                        "AI scoring for question {} returned unparseable output; using keyword score",
                        question.id
                    );
                }
                verdict
            }
            Err(e) => {
                warn!(
                    "AI scoring failed for question {}: {e}; using keyword score",
                    question.id
                );
                None
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Core scoring algorithm
// ────────────────────────────────────────────────────────────────────────────

pub fn assess_keywords(question: &CertificationQuestion, answer: &str) -> KeywordAssessment {
    let points = question.points.max(1);
    let answer_lower = answer.to_lowercase();

    let keywords: Vec<String> = question
        .expected_keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    let matched_keywords = keywords
        .iter()
        .filter(|k| answer_lower.contains(k.as_str()))
        .count();

    let keyword_percentage = if keywords.is_empty() {
        NO_KEYWORDS_PERCENTAGE
    } else {
        matched_keywords as f64 / keywords.len() as f64
    };

    let length_factor = (answer_chars(answer) as f64 / FULL_LENGTH_CHARS).min(1.0);

    let raw = points as f64
        * (KEYWORD_COVERAGE_WEIGHT * keyword_percentage + LENGTH_WEIGHT * length_factor);
    // Shave float noise so an exact 3.0 does not ceil to 4.
    let keyword_score = clamp_points((raw - 1e-9).ceil(), points);

    KeywordAssessment {
        matched_keywords,
        total_keywords: keywords.len(),
        keyword_percentage,
        length_factor,
        keyword_score,
    }
}

fn combine(points: u32, keywords: KeywordAssessment, verdict: Option<RubricVerdict>) -> AnswerScore {
    let (score, ai_score) = match &verdict {
        Some(v) => {
            let blended = KEYWORD_BLEND_WEIGHT * keywords.keyword_score as f64
                + AI_BLEND_WEIGHT * v.score as f64;
            (clamp_points(blended.round(), points), Some(v.score))
        }
        None => (keywords.keyword_score, None),
    };

    let template = feedback_template(score, points);
    let (feedback, strengths, areas_for_improvement) = match verdict {
        Some(v) => (
            v.feedback,
            non_empty_or(v.strengths, template.strength),
            non_empty_or(v.areas_for_improvement, template.improvement),
        ),
        None => (
            template.feedback.to_string(),
            vec![template.strength.to_string()],
            vec![template.improvement.to_string()],
        ),
    };

    AnswerScore {
        score,
        max_points: points,
        feedback,
        strengths,
        areas_for_improvement,
        matched_keywords: keywords.matched_keywords,
        total_keywords: keywords.total_keywords,
        keyword_score: keywords.keyword_score,
        ai_score,
        ai_score_used: ai_score.is_some(),
    }
}

struct FeedbackTemplate {
    feedback: &'static str,
    strength: &'static str,
    improvement: &'static str,
}

/// Canned feedback used when no LLM verdict is available, chosen by score band.
fn feedback_template(score: u32, points: u32) -> FeedbackTemplate {
    let ratio = score as f64 / points.max(1) as f64;

    if ratio >= 0.8 {
        FeedbackTemplate {
            feedback: "Excellent response. You covered the key concepts clearly and with good detail.",
            strength: "Strong command of the key concepts",
            improvement: "Add a real-world example to make the answer even stronger",
        }
    } else if ratio >= 0.6 {
        FeedbackTemplate {
            feedback: "Good response. You addressed most of the important points.",
            strength: "Covers most of the important points",
            improvement: "Explain each step in more detail and use precise terminology",
        }
    } else if ratio >= 0.4 {
        FeedbackTemplate {
            feedback: "Adequate response, but several key concepts were missing or unclear.",
            strength: "Shows a basic understanding of the topic",
            improvement: "Review the module material and cover the missing key concepts",
        }
    } else {
        FeedbackTemplate {
            feedback: "This response needs improvement. Most of the expected concepts were not addressed.",
            strength: "Attempted to answer the question",
            improvement: "Revisit the training module and walk through the procedure step by step",
        }
    }
}

fn build_rubric_prompt(question: &CertificationQuestion, answer: &str) -> String {
    let criteria = question.scoring_criteria.clone().unwrap_or_default();
    let keywords = if question.expected_keywords.is_empty() {
        "None specified".to_string()
    } else {
        question.expected_keywords.join(", ")
    };

    RUBRIC_SCORING_PROMPT
        .replace("{question}", &question.question)
        .replace("{keywords}", &keywords)
        .replace("{points}", &question.points.max(1).to_string())
        .replace("{excellent}", tier(&criteria, Tier::Excellent))
        .replace("{good}", tier(&criteria, Tier::Good))
        .replace("{adequate}", tier(&criteria, Tier::Adequate))
        .replace("{poor}", tier(&criteria, Tier::Poor))
        .replace("{answer}", answer.trim())
}

enum Tier {
    Excellent,
    Good,
    Adequate,
    Poor,
}

fn tier(criteria: &ScoringCriteria, tier: Tier) -> &str {
    let (configured, default) = match tier {
        Tier::Excellent => (
            &criteria.excellent,
            "Complete and accurate; covers every key concept with clear reasoning",
        ),
        Tier::Good => (
            &criteria.good,
            "Mostly accurate; covers most key concepts with minor gaps",
        ),
        Tier::Adequate => (
            &criteria.adequate,
            "Partially correct; shows basic understanding but misses important points",
        ),
        Tier::Poor => (
            &criteria.poor,
            "Incorrect, off-topic, or missing most key concepts",
        ),
    };
    configured.as_deref().unwrap_or(default)
}

/// Raw character count; surrounding whitespace is counted.
fn answer_chars(answer: &str) -> usize {
    answer.chars().count()
}

fn clamp_points(value: f64, points: u32) -> u32 {
    value.clamp(1.0, points.max(1) as f64) as u32
}

fn non_empty_or(items: Vec<String>, fallback: &str) -> Vec<String> {
    if items.is_empty() {
        vec![fallback.to_string()]
    } else {
        items
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::mock::ScriptedModel;

    fn question(points: u32, keywords: &[&str]) -> CertificationQuestion {
        CertificationQuestion {
            id: "q1".to_string(),
            question: "Describe the lockout/tagout procedure.".to_string(),
            points,
            expected_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            scoring_criteria: None,
        }
    }

    fn build_scorer(model: ScriptedModel) -> (HybridScorer, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        (HybridScorer::new(model.clone()), model)
    }

    const LONG_ANSWER: &str = "First isolate the energy source, then apply a lock and tag to the \
        breaker, and verify zero energy before starting maintenance work on the machine.";

    #[test]
    fn test_no_keywords_uses_default_percentage() {
        let a = assess_keywords(&question(5, &[]), "anything");
        assert_eq!(a.keyword_percentage, 0.7);
        assert_eq!(a.total_keywords, 0);

        // Blank keywords do not count as defined.
        let a = assess_keywords(&question(5, &["", "  "]), "anything");
        assert_eq!(a.keyword_percentage, 0.7);
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive_substring() {
        let q = question(5, &["Lock", "TAG", "verif", "permit"]);
        let a = assess_keywords(&q, "I LOCKED it, tagged it and verified it.");
        assert_eq!(a.matched_keywords, 3);
        assert_eq!(a.total_keywords, 4);
        assert!((a.keyword_percentage - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_keyword_score_formula() {
        // 10 chars, no keywords: ceil(5 × (0.7×0.7 + 0.3×0.1)) = ceil(2.6) = 3
        let a = assess_keywords(&question(5, &[]), "abcdefghij");
        assert!((a.length_factor - 0.1).abs() < 1e-12);
        assert_eq!(a.keyword_score, 3);

        // All keywords, long answer: ceil(10 × 1.0) = 10
        let a = assess_keywords(&question(10, &["lock", "tag"]), LONG_ANSWER);
        assert_eq!(a.length_factor, 1.0);
        assert_eq!(a.keyword_score, 10);

        // No keyword matches, empty answer: raw 0 clamps up to 1
        let a = assess_keywords(&question(5, &["lock"]), "");
        assert_eq!(a.keyword_score, 1);
    }

    #[test]
    fn test_length_uses_raw_answer() {
        // 10 letters padded to 20 chars
        let a = assess_keywords(&question(5, &[]), "     abcdefghij     ");
        assert!((a.length_factor - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_padded_answer_counts_toward_llm_cutoff() {
        let (scorer, model) = build_scorer(ScriptedModel::replying(r#"{"score": 4}"#));
        let result = scorer.score(&question(5, &[]), "  abcdefghij      ").await;
        assert_eq!(model.calls(), 1);
        assert!(result.ai_score_used);
    }

    #[test]
    fn test_keyword_percentage_always_in_unit_range() {
        let lists: [&[&str]; 4] = [&[], &["a"], &["lock", "zzz"], &["x", "y", "z", "lock"]];
        for kws in lists {
            let a = assess_keywords(&question(5, kws), LONG_ANSWER);
            assert!((0.0..=1.0).contains(&a.keyword_percentage));
        }
    }

    #[tokio::test]
    async fn test_short_answer_skips_llm() {
        let (scorer, model) = build_scorer(ScriptedModel::replying(r#"{"score": 1}"#));
        let q = question(5, &[]);
        let result = scorer.score(&q, "abcdefghij").await;

        assert!(!result.ai_score_used);
        assert_eq!(result.ai_score, None);
        assert_eq!(result.score, result.keyword_score);
        assert_eq!(result.score, 3);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_blends_keyword_and_ai_scores() {
        let (scorer, model) = build_scorer(ScriptedModel::replying(
            r#"{"score": 2, "feedback": "Missing the verification step.", "strengths": ["Correct isolation"], "areas_for_improvement": []}"#,
        ));
        let q = question(10, &["lock", "tag"]);
        let result = scorer.score(&q, LONG_ANSWER).await;

        // round(0.4 × 10 + 0.6 × 2) = round(5.2) = 5
        assert!(result.ai_score_used);
        assert_eq!(result.ai_score, Some(2));
        assert_eq!(result.keyword_score, 10);
        assert_eq!(result.score, 5);
        assert_eq!(result.feedback, "Missing the verification step.");
        assert_eq!(result.strengths, vec!["Correct isolation"]);
        // Empty list from the model is backfilled from the band template.
        assert_eq!(result.areas_for_improvement.len(), 1);
        assert_eq!(model.calls(), 1);
        assert!(model.last_prompt().unwrap().contains("lock, tag"));
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_keyword_score() {
        let (scorer, _) = build_scorer(ScriptedModel::new(vec![Err("timeout".into())]));
        let q = question(5, &["lock", "tag", "verify", "permit"]);
        let result = scorer.score(&q, LONG_ANSWER).await;

        assert!(!result.ai_score_used);
        assert_eq!(result.score, result.keyword_score);
        assert_eq!(result.matched_keywords, 3);
        assert_eq!(result.total_keywords, 4);
    }

    #[tokio::test]
    async fn test_malformed_llm_output_falls_back() {
        let (scorer, _) = build_scorer(ScriptedModel::replying("Score: 4/5, nice job"));
        let result = scorer.score(&question(5, &[]), LONG_ANSWER).await;
        assert!(!result.ai_score_used);
        assert_eq!(result.score, result.keyword_score);
    }

    #[tokio::test]
    async fn test_score_always_within_bounds() {
        let answers = ["", "ok", "abcdefghij", LONG_ANSWER];
        let replies = [r#"{"score": 99}"#, r#"{"score": -5}"#, "garbage"];
        for points in 1..=10 {
            for answer in answers {
                for reply in replies {
                    let (scorer, _) = build_scorer(ScriptedModel::replying(reply));
                    let result = scorer.score(&question(points, &["lock", "xyz"]), answer).await;
                    assert!(
                        (1..=points).contains(&result.score),
                        "points={points} answer={answer:?} reply={reply} score={}",
                        result.score
                    );
                }
            }
        }
    }

    #[test]
    fn test_feedback_bands() {
        assert!(feedback_template(5, 5).feedback.starts_with("Excellent"));
        assert!(feedback_template(4, 5).feedback.starts_with("Excellent"));
        assert!(feedback_template(3, 5).feedback.starts_with("Good"));
        assert!(feedback_template(2, 5).feedback.starts_with("Adequate"));
        assert!(feedback_template(1, 5).feedback.contains("needs improvement"));
    }

    #[test]
    fn test_prompt_uses_configured_criteria() {
        let mut q = question(4, &[]);
        q.scoring_criteria = Some(ScoringCriteria {
            excellent: Some("Names all six steps".to_string()),
            ..Default::default()
        });
        let prompt = build_rubric_prompt(&q, "  my answer  ");
        assert!(prompt.contains("Names all six steps"));
        assert!(prompt.contains("None specified"));
        assert!(prompt.contains("1 to 4 points"));
        assert!(prompt.contains("my answer"));
        assert!(!prompt.contains("{good}"));
    }
}
