//! Aggregate statistics over a stored response list.
//!
//! Always recomputed from scratch; never maintained incrementally.

use serde::{Deserialize, Serialize};

/// Anything that can be folded into `ResponseStats`.
pub trait StatSample {
    fn score(&self) -> f64;
    fn max_score(&self) -> f64;
    fn speaking_time(&self) -> Option<f64>;
    fn response_length(&self) -> usize;
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseStats {
    pub total_responses: usize,
    pub average_score: f64,
    pub average_speaking_time: f64,
    pub average_response_length: f64,
}

impl ResponseStats {
    pub fn from_samples<S: StatSample>(samples: &[S]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::default();
        }

        let total_score: f64 = samples.iter().map(|s| s.score()).sum();
        let total_length: usize = samples.iter().map(|s| s.response_length()).sum();
        // Responses without a recorded speaking time count as zero.
        let total_time: f64 = samples
            .iter()
            .map(|s| s.speaking_time().unwrap_or(0.0))
            .sum();

        Self {
            total_responses: n,
            average_score: total_score / n as f64,
            average_speaking_time: total_time / n as f64,
            average_response_length: total_length as f64 / n as f64,
        }
    }
}

/// `round(100 × Σscore / Σmax_score)`, or 0 for an empty list.
pub fn overall_percentage<S: StatSample>(samples: &[S]) -> u32 {
    let earned: f64 = samples.iter().map(|s| s.score()).sum();
    let possible: f64 = samples.iter().map(|s| s.max_score()).sum();
    percentage(earned, possible)
}

/// `round(100 × earned / possible)`, or 0 when nothing was possible.
/// Callers keep `earned <= possible`; the result is not clamped.
pub fn percentage(earned: f64, possible: f64) -> u32 {
    if possible <= 0.0 {
        return 0;
    }
    (100.0 * earned / possible).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample(f64, f64, Option<f64>, usize);

    impl StatSample for Sample {
        fn score(&self) -> f64 {
            self.0
        }
        fn max_score(&self) -> f64 {
            self.1
        }
        fn speaking_time(&self) -> Option<f64> {
            self.2
        }
        fn response_length(&self) -> usize {
            self.3
        }
    }

    #[test]
    fn test_empty_list_is_all_zero() {
        let stats = ResponseStats::from_samples::<Sample>(&[]);
        assert_eq!(stats, ResponseStats::default());
        assert_eq!(stats.average_score, 0.0);
        assert_eq!(overall_percentage::<Sample>(&[]), 0);
    }

    #[test]
    fn test_averages() {
        let samples = [
            Sample(8.0, 10.0, Some(30.0), 40),
            Sample(6.0, 10.0, Some(20.0), 20),
            Sample(4.0, 10.0, None, 30),
        ];
        let stats = ResponseStats::from_samples(&samples);
        assert_eq!(stats.total_responses, 3);
        assert!((stats.average_score - 6.0).abs() < 1e-12);
        assert!((stats.average_speaking_time - 50.0 / 3.0).abs() < 1e-12);
        assert!((stats.average_response_length - 30.0).abs() < 1e-12);
        assert_eq!(overall_percentage(&samples), 60);
    }

    #[test]
    fn test_rollup_is_idempotent() {
        let samples = [Sample(3.0, 5.0, Some(12.5), 17), Sample(5.0, 5.0, None, 3)];
        assert_eq!(
            ResponseStats::from_samples(&samples),
            ResponseStats::from_samples(&samples)
        );
    }

    #[test]
    fn test_percentage_rounding_and_guard() {
        assert_eq!(percentage(40.0, 50.0), 80);
        assert_eq!(percentage(30.0, 50.0), 60);
        assert_eq!(percentage(2.0, 3.0), 67);
        assert_eq!(percentage(5.0, 0.0), 0);
        // Not clamped: an over-full score stays visible.
        assert_eq!(percentage(6.0, 5.0), 120);
    }
}
