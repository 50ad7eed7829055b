//! Threshold-based alerting.
//!
//! Each metric kind can carry a warning and a critical threshold. An alert
//! check compares the latest sample against them (critical supersedes
//! warning) and raises an alert unless an unresolved one of the same kind
//! and level already exists within the cooldown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::metric::MetricKind;

/// Default minimum spacing between duplicate alerts of one kind+level.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(60);

static ALERT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertLevel {
    /// Informational.
    Info,
    /// Threshold breach worth attention.
    Warning,
    /// Serious breach.
    Error,
    /// Breach requiring immediate action.
    Critical,
}

impl AlertLevel {
    /// Returns the level name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raised alert.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Unique alert id.
    pub id: u64,
    /// Severity.
    pub level: AlertLevel,
    /// Human-readable description.
    pub message: String,
    /// Metric that breached.
    pub kind: MetricKind,
    /// Value at breach time.
    pub value: f64,
    /// Threshold that was crossed.
    pub threshold: f64,
    /// Wall-clock time of the breach.
    pub at: DateTime<Utc>,
    /// Set once explicitly resolved.
    pub resolved: bool,
    /// Monotonic creation time, used for cooldown checks.
    pub(crate) raised_at: Instant,
}

impl Alert {
    pub(crate) fn new(
        level: AlertLevel,
        kind: MetricKind,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            id: ALERT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            level,
            message: format!("{kind} at {value:.2} crossed {level} threshold {threshold:.2}"),
            kind,
            value,
            threshold,
            at: Utc::now(),
            resolved: false,
            raised_at: Instant::now(),
        }
    }
}

/// Warning/critical threshold pair for one metric kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// Crossing raises a `Warning` alert.
    pub warning: f64,
    /// Crossing raises a `Critical` alert, superseding the warning.
    pub critical: f64,
}

/// Alert state: configured thresholds plus raised alerts.
pub(crate) struct AlertState {
    thresholds: HashMap<MetricKind, Threshold>,
    alerts: Vec<Alert>,
    cooldown: Duration,
}

impl AlertState {
    pub(crate) fn new(cooldown: Duration) -> Self {
        Self {
            thresholds: HashMap::new(),
            alerts: Vec::new(),
            cooldown,
        }
    }

    pub(crate) fn set_threshold(&mut self, kind: MetricKind, threshold: Threshold) {
        self.thresholds.insert(kind, threshold);
    }

    pub(crate) fn threshold(&self, kind: MetricKind) -> Option<Threshold> {
        self.thresholds.get(&kind).copied()
    }

    /// Evaluates the latest values against thresholds, raising new alerts.
    /// Returns the alerts raised by this pass.
    pub(crate) fn check(&mut self, latest: &HashMap<MetricKind, f64>) -> Vec<Alert> {
        let mut raised = Vec::new();

        for (kind, threshold) in self.thresholds.clone() {
            let Some(&value) = latest.get(&kind) else {
                continue;
            };

            // Critical supersedes warning.
            let breach = if value >= threshold.critical {
                Some((AlertLevel::Critical, threshold.critical))
            } else if value >= threshold.warning {
                Some((AlertLevel::Warning, threshold.warning))
            } else {
                None
            };

            let Some((level, crossed)) = breach else {
                continue;
            };

            if self.is_duplicate(kind, level) {
                continue;
            }

            let alert = Alert::new(level, kind, value, crossed);
            raised.push(alert.clone());
            self.alerts.push(alert);
        }
        raised
    }

    /// True when an unresolved alert of the same kind+level exists within
    /// the cooldown window.
    fn is_duplicate(&self, kind: MetricKind, level: AlertLevel) -> bool {
        self.alerts.iter().any(|a| {
            a.kind == kind
                && a.level == level
                && !a.resolved
                && a.raised_at.elapsed() < self.cooldown
        })
    }

    pub(crate) fn active(&self) -> Vec<Alert> {
        self.alerts.iter().filter(|a| !a.resolved).cloned().collect()
    }

    pub(crate) fn all(&self) -> &[Alert] {
        &self.alerts
    }

    /// Marks an alert resolved. Returns false for unknown ids.
    pub(crate) fn resolve(&mut self, id: u64) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest(pairs: &[(MetricKind, f64)]) -> HashMap<MetricKind, f64> {
        pairs.iter().copied().collect()
    }

    fn state() -> AlertState {
        let mut state = AlertState::new(DEFAULT_ALERT_COOLDOWN);
        state.set_threshold(
            MetricKind::CpuUsage,
            Threshold {
                warning: 70.0,
                critical: 90.0,
            },
        );
        state
    }

    #[test]
    fn test_no_alert_below_warning() {
        let mut state = state();
        let raised = state.check(&latest(&[(MetricKind::CpuUsage, 50.0)]));
        assert!(raised.is_empty());
        assert!(state.active().is_empty());
    }

    #[test]
    fn test_warning_alert() {
        let mut state = state();
        let raised = state.check(&latest(&[(MetricKind::CpuUsage, 75.0)]));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, AlertLevel::Warning);
        assert_eq!(raised[0].kind, MetricKind::CpuUsage);
    }

    #[test]
    fn test_critical_supersedes_warning() {
        let mut state = state();
        let raised = state.check(&latest(&[(MetricKind::CpuUsage, 95.0)]));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, AlertLevel::Critical);
        assert_eq!(raised[0].threshold, 90.0);
    }

    #[test]
    fn test_duplicate_suppressed_within_cooldown() {
        let mut state = state();
        assert_eq!(state.check(&latest(&[(MetricKind::CpuUsage, 75.0)])).len(), 1);
        assert!(state.check(&latest(&[(MetricKind::CpuUsage, 76.0)])).is_empty());
        assert_eq!(state.active().len(), 1);
    }

    #[test]
    fn test_resolved_alert_allows_new_one() {
        let mut state = state();
        let raised = state.check(&latest(&[(MetricKind::CpuUsage, 75.0)]));
        assert!(state.resolve(raised[0].id));

        let raised = state.check(&latest(&[(MetricKind::CpuUsage, 77.0)]));
        assert_eq!(raised.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let mut state = state();
        assert!(!state.resolve(999_999));
    }

    #[test]
    fn test_alert_ids_unique() {
        let a = Alert::new(AlertLevel::Info, MetricKind::CpuUsage, 1.0, 1.0);
        let b = Alert::new(AlertLevel::Info, MetricKind::CpuUsage, 1.0, 1.0);
        assert_ne!(a.id, b.id);
    }
}
