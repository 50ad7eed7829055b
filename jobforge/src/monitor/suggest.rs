//! Optimization suggestions derived from current metrics.
//!
//! Suggestions are ephemeral: regenerated on every monitoring pass and
//! ranked by priority (1–10). Only high-priority suggestions are applied
//! automatically by the auto-tune loop; the rest are reported.

use std::collections::HashMap;

use super::metric::MetricKind;

/// CPU percentage above which fewer workers are suggested.
pub const CPU_HIGH_WATERMARK: f64 = 80.0;

/// CPU percentage below which more workers are suggested.
pub const CPU_LOW_WATERMARK: f64 = 30.0;

/// Cache hit rate below which a larger cache is suggested.
pub const CACHE_HIT_RATE_FLOOR: f64 = 0.6;

/// Error rate above which a retry-policy change is suggested.
pub const ERROR_RATE_CEILING: f64 = 0.10;

/// Suggestions at or above this priority are applied by auto-tune.
pub const AUTO_APPLY_PRIORITY: u8 = 8;

/// What a suggestion proposes to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionAction {
    /// Grow the worker pool.
    IncreaseWorkers,
    /// Shrink the worker pool.
    DecreaseWorkers,
    /// Grow the cache budgets.
    ResizeCache,
    /// Switch the cache eviction strategy.
    ChangeCacheStrategy,
    /// Change the scheduler's default retry policy.
    AdjustRetryPolicy,
    /// Change the batch submission window.
    AdjustBatchSize,
}

impl SuggestionAction {
    /// Returns the action name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionAction::IncreaseWorkers => "increase_workers",
            SuggestionAction::DecreaseWorkers => "decrease_workers",
            SuggestionAction::ResizeCache => "resize_cache",
            SuggestionAction::ChangeCacheStrategy => "change_cache_strategy",
            SuggestionAction::AdjustRetryPolicy => "adjust_retry_policy",
            SuggestionAction::AdjustBatchSize => "adjust_batch_size",
        }
    }
}

impl std::fmt::Display for SuggestionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generated optimization suggestion.
#[derive(Debug, Clone)]
pub struct OptimizationSuggestion {
    /// Proposed change.
    pub action: SuggestionAction,
    /// Why it is proposed.
    pub reason: String,
    /// Expected effect, for operators.
    pub expected_improvement: String,
    /// Priority 1–10; higher is more urgent.
    pub priority: u8,
    /// Action parameters (e.g. the observed value that triggered it).
    pub params: HashMap<String, f64>,
}

/// Generates suggestions from the latest metric values.
///
/// Rule set:
/// - CPU > 80% → fewer workers (priority 8)
/// - CPU < 30% → more workers (priority 5)
/// - cache hit rate < 0.6 → larger cache (priority 7)
/// - error rate > 0.10 → retry-policy change (priority 9)
pub(crate) fn generate(latest: &HashMap<MetricKind, f64>) -> Vec<OptimizationSuggestion> {
    let mut suggestions = Vec::new();

    if let Some(&cpu) = latest.get(&MetricKind::CpuUsage) {
        if cpu > CPU_HIGH_WATERMARK {
            suggestions.push(OptimizationSuggestion {
                action: SuggestionAction::DecreaseWorkers,
                reason: format!("CPU usage {cpu:.1}% above {CPU_HIGH_WATERMARK:.0}%"),
                expected_improvement: "less contention, lower per-job latency".to_string(),
                priority: 8,
                params: [("cpu_usage".to_string(), cpu)].into_iter().collect(),
            });
        } else if cpu < CPU_LOW_WATERMARK {
            suggestions.push(OptimizationSuggestion {
                action: SuggestionAction::IncreaseWorkers,
                reason: format!("CPU usage {cpu:.1}% below {CPU_LOW_WATERMARK:.0}%"),
                expected_improvement: "higher throughput from idle capacity".to_string(),
                priority: 5,
                params: [("cpu_usage".to_string(), cpu)].into_iter().collect(),
            });
        }
    }

    if let Some(&hit_rate) = latest.get(&MetricKind::CacheHitRate) {
        if hit_rate < CACHE_HIT_RATE_FLOOR {
            suggestions.push(OptimizationSuggestion {
                action: SuggestionAction::ResizeCache,
                reason: format!("cache hit rate {hit_rate:.2} below {CACHE_HIT_RATE_FLOOR}"),
                expected_improvement: "fewer recomputations of cached work".to_string(),
                priority: 7,
                params: [("hit_rate".to_string(), hit_rate)].into_iter().collect(),
            });
        }
    }

    if let Some(&error_rate) = latest.get(&MetricKind::ErrorRate) {
        if error_rate > ERROR_RATE_CEILING {
            suggestions.push(OptimizationSuggestion {
                action: SuggestionAction::AdjustRetryPolicy,
                reason: format!("error rate {error_rate:.2} above {ERROR_RATE_CEILING}"),
                expected_improvement: "less retry pressure while failures persist".to_string(),
                priority: 9,
                params: [("error_rate".to_string(), error_rate)].into_iter().collect(),
            });
        }
    }

    // Most urgent first.
    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest(pairs: &[(MetricKind, f64)]) -> HashMap<MetricKind, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_high_cpu_suggests_fewer_workers() {
        let suggestions = generate(&latest(&[(MetricKind::CpuUsage, 85.0)]));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].action, SuggestionAction::DecreaseWorkers);
        assert!(suggestions[0].priority >= 8);
    }

    #[test]
    fn test_low_cpu_suggests_more_workers() {
        let suggestions = generate(&latest(&[(MetricKind::CpuUsage, 10.0)]));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].action, SuggestionAction::IncreaseWorkers);
        assert_eq!(suggestions[0].priority, 5);
    }

    #[test]
    fn test_moderate_cpu_no_suggestion() {
        let suggestions = generate(&latest(&[(MetricKind::CpuUsage, 50.0)]));
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_poor_hit_rate_suggests_larger_cache() {
        let suggestions = generate(&latest(&[(MetricKind::CacheHitRate, 0.4)]));
        assert_eq!(suggestions[0].action, SuggestionAction::ResizeCache);
        assert_eq!(suggestions[0].priority, 7);
    }

    #[test]
    fn test_high_error_rate_suggests_retry_change() {
        let suggestions = generate(&latest(&[(MetricKind::ErrorRate, 0.2)]));
        assert_eq!(suggestions[0].action, SuggestionAction::AdjustRetryPolicy);
        assert_eq!(suggestions[0].priority, 9);
    }

    #[test]
    fn test_suggestions_sorted_by_priority() {
        let suggestions = generate(&latest(&[
            (MetricKind::CpuUsage, 20.0),
            (MetricKind::ErrorRate, 0.5),
            (MetricKind::CacheHitRate, 0.1),
        ]));

        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].priority, 9);
        assert_eq!(suggestions[1].priority, 7);
        assert_eq!(suggestions[2].priority, 5);
    }
}
