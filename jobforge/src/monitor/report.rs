//! Health scoring and periodic reports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::alert::Alert;
use super::metric::{MetricKind, MetricStatistics};
use super::suggest::OptimizationSuggestion;

/// Coarse health classification derived from the deduction score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLabel {
    /// Score ≥ 90.
    Excellent,
    /// Score ≥ 75.
    Good,
    /// Score ≥ 60.
    Fair,
    /// Score ≥ 40.
    Poor,
    /// Everything below.
    Critical,
}

impl HealthLabel {
    /// Returns the label name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Excellent => "excellent",
            HealthLabel::Good => "good",
            HealthLabel::Fair => "fair",
            HealthLabel::Poor => "poor",
            HealthLabel::Critical => "critical",
        }
    }

    fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthLabel::Excellent
        } else if score >= 75.0 {
            HealthLabel::Good
        } else if score >= 60.0 {
            HealthLabel::Fair
        } else if score >= 40.0 {
            HealthLabel::Poor
        } else {
            HealthLabel::Critical
        }
    }
}

impl std::fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Computes the weighted deduction score, starting from 100.
///
/// Deductions: CPU > 90 → −30, > 70 → −15; memory > 95 → −25, > 80 → −10;
/// error rate > 0.15 → −20, > 0.05 → −10; cache hit rate < 0.5 → −15,
/// < 0.7 → −5. Missing metrics deduct nothing.
pub fn health_score(latest: &HashMap<MetricKind, f64>) -> f64 {
    let mut score: f64 = 100.0;

    if let Some(&cpu) = latest.get(&MetricKind::CpuUsage) {
        if cpu > 90.0 {
            score -= 30.0;
        } else if cpu > 70.0 {
            score -= 15.0;
        }
    }

    if let Some(&memory) = latest.get(&MetricKind::MemoryUsage) {
        if memory > 95.0 {
            score -= 25.0;
        } else if memory > 80.0 {
            score -= 10.0;
        }
    }

    if let Some(&error_rate) = latest.get(&MetricKind::ErrorRate) {
        if error_rate > 0.15 {
            score -= 20.0;
        } else if error_rate > 0.05 {
            score -= 10.0;
        }
    }

    if let Some(&hit_rate) = latest.get(&MetricKind::CacheHitRate) {
        if hit_rate < 0.5 {
            score -= 15.0;
        } else if hit_rate < 0.7 {
            score -= 5.0;
        }
    }

    score.max(0.0)
}

/// Derives the health label for the latest metric values.
pub fn health_label(latest: &HashMap<MetricKind, f64>) -> HealthLabel {
    HealthLabel::from_score(health_score(latest))
}

/// A point-in-time performance report over a trailing window.
#[derive(Debug, Clone)]
pub struct PerformanceReport {
    /// Window start (wall clock).
    pub start: DateTime<Utc>,
    /// Window end (wall clock).
    pub end: DateTime<Utc>,
    /// Statistics per metric kind with samples in the window.
    pub statistics: HashMap<MetricKind, MetricStatistics>,
    /// Unresolved alerts at report time.
    pub alerts: Vec<Alert>,
    /// Suggestions generated at report time.
    pub suggestions: Vec<OptimizationSuggestion>,
    /// Deduction score, 0–100.
    pub health_score: f64,
    /// Coarse health classification.
    pub health: HealthLabel,
}

impl PerformanceReport {
    /// Formats the report as a human-readable block.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str("Performance Report\n");
        out.push_str(&format!("Window: {} .. {}\n", self.start, self.end));
        out.push_str(&format!(
            "Health: {} (score {:.0})\n\nMETRICS\n",
            self.health, self.health_score
        ));

        let mut kinds: Vec<&MetricKind> = self.statistics.keys().collect();
        kinds.sort_by_key(|k| k.as_str());
        for kind in kinds {
            let stats = &self.statistics[kind];
            out.push_str(&format!(
                "  {:<16} n={:<5} mean={:<10.3} min={:<10.3} max={:<10.3}\n",
                kind.as_str(),
                stats.count,
                stats.mean,
                stats.min,
                stats.max,
            ));
        }

        out.push_str(&format!("\nACTIVE ALERTS ({})\n", self.alerts.len()));
        for alert in &self.alerts {
            out.push_str(&format!("  [{}] {}\n", alert.level, alert.message));
        }

        out.push_str(&format!("\nSUGGESTIONS ({})\n", self.suggestions.len()));
        for suggestion in &self.suggestions {
            out.push_str(&format!(
                "  (p{}) {}: {}\n",
                suggestion.priority, suggestion.action, suggestion.reason
            ));
        }
        out
    }
}
