//! Composite priority scoring.
//!
//! A source's score is a weighted sum of five sub-scores, each in [0, 1]:
//! importance, urgency, recent performance, resource availability, and
//! time-of-day. The weights sum to exactly 1.0 so the total stays in [0, 1].

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

/// Weight of the importance sub-score.
pub const WEIGHT_IMPORTANCE: f64 = 0.30;
/// Weight of the urgency sub-score.
pub const WEIGHT_URGENCY: f64 = 0.25;
/// Weight of the recent-performance sub-score.
pub const WEIGHT_PERFORMANCE: f64 = 0.20;
/// Weight of the resource-availability sub-score.
pub const WEIGHT_RESOURCE: f64 = 0.15;
/// Weight of the time-of-day sub-score.
pub const WEIGHT_TIME: f64 = 0.10;

/// Outcomes retained per source for the performance sub-score.
pub const OUTCOME_HISTORY_LEN: usize = 20;

/// Trailing outcomes inspected for the automatic error-rate check.
pub const ERROR_RATE_WINDOW: usize = 10;

/// Average duration at or beyond which the speed component scores 0.
///
/// Sub-second sources score close to 1 without any cross-source state.
pub const SLOW_REFERENCE: Duration = Duration::from_secs(30);

/// Performance sub-score used when a source has no recorded history.
pub const DEFAULT_PERFORMANCE_SCORE: f64 = 0.5;

/// The composite priority score for one source.
///
/// Recomputed on demand; never persisted beyond the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityScore {
    /// Weighted total in [0, 1].
    pub total: f64,
    /// Importance sub-score in [0, 1].
    pub importance: f64,
    /// Urgency sub-score in [0, 1].
    pub urgency: f64,
    /// Recent-performance sub-score in [0, 1].
    pub performance: f64,
    /// Resource-availability sub-score in [0, 1].
    pub resource: f64,
    /// Time-of-day sub-score in [0, 1].
    pub time: f64,
}

impl PriorityScore {
    /// Combines the five sub-scores into a total using the fixed weights.
    pub fn combine(
        importance: f64,
        urgency: f64,
        performance: f64,
        resource: f64,
        time: f64,
    ) -> Self {
        let total = importance * WEIGHT_IMPORTANCE
            + urgency * WEIGHT_URGENCY
            + performance * WEIGHT_PERFORMANCE
            + resource * WEIGHT_RESOURCE
            + time * WEIGHT_TIME;

        Self {
            total: total.clamp(0.0, 1.0),
            importance,
            urgency,
            performance,
            resource,
            time,
        }
    }
}

/// One recorded execution outcome for a source.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    /// Whether the run succeeded.
    pub success: bool,
    /// Wall-clock processing time of the run.
    pub duration: Duration,
    /// Error description for failed runs.
    pub error: Option<String>,
}

/// Bounded history of recent outcomes for one source.
///
/// Holds at most [`OUTCOME_HISTORY_LEN`] entries; older outcomes are dropped.
#[derive(Debug, Default)]
pub struct OutcomeHistory {
    outcomes: VecDeque<SourceOutcome>,
}

impl OutcomeHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(OUTCOME_HISTORY_LEN),
        }
    }

    /// Appends an outcome, evicting the oldest entry when full.
    pub fn push(&mut self, outcome: SourceOutcome) {
        if self.outcomes.len() == OUTCOME_HISTORY_LEN {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }

    /// Number of retained outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True if no outcomes have been recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Performance sub-score: `0.7 × success-rate + 0.3 × normalized-speed`.
    ///
    /// Returns [`DEFAULT_PERFORMANCE_SCORE`] when no history exists.
    /// Normalized speed maps the average duration linearly so that an
    /// instantaneous run scores 1.0 and [`SLOW_REFERENCE`] or slower scores 0.
    pub fn performance_score(&self) -> f64 {
        if self.outcomes.is_empty() {
            return DEFAULT_PERFORMANCE_SCORE;
        }

        let successes = self.outcomes.iter().filter(|o| o.success).count();
        let success_rate = successes as f64 / self.outcomes.len() as f64;

        let total: Duration = self.outcomes.iter().map(|o| o.duration).sum();
        let avg_secs = total.as_secs_f64() / self.outcomes.len() as f64;
        let speed = (1.0 - avg_secs / SLOW_REFERENCE.as_secs_f64()).clamp(0.0, 1.0);

        0.7 * success_rate + 0.3 * speed
    }

    /// Error rate over the trailing [`ERROR_RATE_WINDOW`] outcomes.
    ///
    /// Returns 0.0 with no history.
    pub fn trailing_error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let window = self
            .outcomes
            .iter()
            .rev()
            .take(ERROR_RATE_WINDOW)
            .collect::<Vec<_>>();
        let failures = window.iter().filter(|o| !o.success).count();
        failures as f64 / window.len() as f64
    }
}

/// Time-of-day step function favoring the declared active hours.
///
/// Scores 1.0 inside `[start, end)`, 0.6 within one hour either side, and
/// 0.3 otherwise. Hours are taken from the supplied timestamp's clock.
pub fn time_of_day_score(now: DateTime<Utc>, active_start: u32, active_end: u32) -> f64 {
    let hour = now.hour();
    let in_range = |h: u32, lo: u32, hi: u32| {
        if lo <= hi {
            h >= lo && h < hi
        } else {
            // Active window wraps past midnight.
            h >= lo || h < hi
        }
    };

    if in_range(hour, active_start, active_end) {
        1.0
    } else {
        let shoulder_start = active_start.checked_sub(1).unwrap_or(23);
        let shoulder_end = (active_end + 1) % 24;
        if in_range(hour, shoulder_start, active_start) || in_range(hour, active_end, shoulder_end)
        {
            0.6
        } else {
            0.3
        }
    }
}

/// Maps a [1, 10] rating onto [0, 1].
#[inline]
pub fn rating_score(rating: u8) -> f64 {
    f64::from(rating) / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weights_sum_to_one() {
        let sum =
            WEIGHT_IMPORTANCE + WEIGHT_URGENCY + WEIGHT_PERFORMANCE + WEIGHT_RESOURCE + WEIGHT_TIME;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_combine_bounds() {
        let score = PriorityScore::combine(1.0, 1.0, 1.0, 1.0, 1.0);
        assert!((score.total - 1.0).abs() < 1e-9);

        let score = PriorityScore::combine(0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_empty_history_defaults() {
        let history = OutcomeHistory::new();
        assert_eq!(history.performance_score(), DEFAULT_PERFORMANCE_SCORE);
        assert_eq!(history.trailing_error_rate(), 0.0);
    }

    #[test]
    fn test_history_bounded() {
        let mut history = OutcomeHistory::new();
        for _ in 0..(OUTCOME_HISTORY_LEN + 5) {
            history.push(SourceOutcome {
                success: true,
                duration: Duration::from_millis(100),
                error: None,
            });
        }
        assert_eq!(history.len(), OUTCOME_HISTORY_LEN);
    }

    #[test]
    fn test_performance_score_all_success_fast() {
        let mut history = OutcomeHistory::new();
        for _ in 0..5 {
            history.push(SourceOutcome {
                success: true,
                duration: Duration::from_millis(300),
                error: None,
            });
        }
        let score = history.performance_score();
        assert!(score > 0.95, "fast successful source scores high: {score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_performance_score_all_failures() {
        let mut history = OutcomeHistory::new();
        for _ in 0..5 {
            history.push(SourceOutcome {
                success: false,
                duration: Duration::from_secs(40),
                error: Some("timeout".to_string()),
            });
        }
        // Success component 0, speed component 0 (slower than reference).
        assert_eq!(history.performance_score(), 0.0);
    }

    #[test]
    fn test_trailing_error_rate_window() {
        let mut history = OutcomeHistory::new();
        // 10 old successes followed by 10 failures: trailing window is all
        // failures.
        for _ in 0..10 {
            history.push(SourceOutcome {
                success: true,
                duration: Duration::from_millis(10),
                error: None,
            });
        }
        for _ in 0..10 {
            history.push(SourceOutcome {
                success: false,
                duration: Duration::from_millis(10),
                error: Some("boom".to_string()),
            });
        }
        assert_eq!(history.trailing_error_rate(), 1.0);
    }

    #[test]
    fn test_time_of_day_score_steps() {
        let at = |hour: u32| Utc.with_ymd_and_hms(2024, 3, 4, hour, 30, 0).unwrap();

        assert_eq!(time_of_day_score(at(12), 9, 17), 1.0);
        assert_eq!(time_of_day_score(at(8), 9, 17), 0.6);
        assert_eq!(time_of_day_score(at(17), 9, 17), 0.6);
        assert_eq!(time_of_day_score(at(3), 9, 17), 0.3);
    }

    #[test]
    fn test_time_of_day_score_wrapping_window() {
        let at = |hour: u32| Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap();

        // Active 22:00 → 04:00 wraps midnight.
        assert_eq!(time_of_day_score(at(23), 22, 4), 1.0);
        assert_eq!(time_of_day_score(at(2), 22, 4), 1.0);
        assert_eq!(time_of_day_score(at(12), 22, 4), 0.3);
    }

    #[test]
    fn test_rating_score() {
        assert_eq!(rating_score(10), 1.0);
        assert_eq!(rating_score(1), 0.1);
    }
}
