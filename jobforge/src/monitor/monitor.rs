//! Performance monitor facade.
//!
//! Records metrics from the other subsystems, evaluates threshold alerts,
//! computes the system health score, and generates optimization
//! suggestions. Read-only calls always succeed with best-available data:
//! with no samples yet they return zero-valued structures, never errors.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use super::alert::{Alert, AlertState, Threshold, DEFAULT_ALERT_COOLDOWN};
use super::metric::{
    Metric, MetricKind, MetricStatistics, MetricStore, DEFAULT_STATS_WINDOW,
    METRIC_RING_CAPACITY,
};
use super::report::{health_label, health_score, PerformanceReport};
use super::suggest::{self, OptimizationSuggestion};

/// Default interval between monitoring passes (alert check + auto-tune).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Errors returned by monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No alert with the given id exists.
    #[error("unknown alert: {0}")]
    AlertNotFound(u64),
}

/// Configuration for the performance monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Samples retained per metric kind.
    pub ring_capacity: usize,
    /// Default trailing window for statistics and reports.
    pub stats_window: Duration,
    /// Minimum spacing between duplicate alerts of one kind+level.
    pub alert_cooldown: Duration,
    /// Interval between monitoring passes.
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ring_capacity: METRIC_RING_CAPACITY,
            stats_window: DEFAULT_STATS_WINDOW,
            alert_cooldown: DEFAULT_ALERT_COOLDOWN,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Records metrics, raises alerts, and produces reports and suggestions.
pub struct PerformanceMonitor {
    store: MetricStore,
    alerts: Mutex<AlertState>,
    config: MonitorConfig,
}

impl PerformanceMonitor {
    /// Creates a monitor with sensible default thresholds for system
    /// metrics; use [`PerformanceMonitor::set_threshold`] to override.
    pub fn new(config: MonitorConfig) -> Self {
        let mut alerts = AlertState::new(config.alert_cooldown);
        alerts.set_threshold(
            MetricKind::CpuUsage,
            Threshold {
                warning: 70.0,
                critical: 90.0,
            },
        );
        alerts.set_threshold(
            MetricKind::MemoryUsage,
            Threshold {
                warning: 80.0,
                critical: 95.0,
            },
        );
        alerts.set_threshold(
            MetricKind::ErrorRate,
            Threshold {
                warning: 0.10,
                critical: 0.25,
            },
        );

        Self {
            store: MetricStore::new(config.ring_capacity),
            alerts: Mutex::new(alerts),
            config,
        }
    }

    /// Records one sample.
    pub fn record(
        &self,
        kind: MetricKind,
        value: f64,
        source: Option<String>,
        tags: Option<HashMap<String, String>>,
    ) {
        self.store.record(Metric {
            kind,
            value,
            at: std::time::Instant::now(),
            source,
            tags: tags.unwrap_or_default(),
        });
    }

    /// Records a job outcome: a latency sample plus a 0/1 error sample, so
    /// the mean of `ErrorRate` over a window is the window's error rate.
    pub fn record_job_outcome(&self, success: bool, duration: Duration, source: Option<String>) {
        self.record(
            MetricKind::JobLatency,
            duration.as_secs_f64() * 1000.0,
            source.clone(),
            None,
        );
        self.record(
            MetricKind::ErrorRate,
            if success { 0.0 } else { 1.0 },
            source,
            None,
        );
    }

    /// Records one system resource sample (both in percent).
    pub fn record_system_sample(&self, cpu_usage: f64, memory_usage: f64) {
        self.record(MetricKind::CpuUsage, cpu_usage, None, None);
        self.record(MetricKind::MemoryUsage, memory_usage, None, None);
    }

    /// Records one cache sample.
    pub fn record_cache_sample(&self, hit_rate: f64, size_bytes: usize) {
        self.record(MetricKind::CacheHitRate, hit_rate, None, None);
        self.record(MetricKind::CacheSize, size_bytes as f64, None, None);
    }

    /// Latest value per metric kind.
    pub fn current(&self) -> HashMap<MetricKind, f64> {
        self.store.current()
    }

    /// Latest value for one kind.
    pub fn latest(&self, kind: MetricKind) -> Option<f64> {
        self.store.latest(kind)
    }

    /// Statistics for one kind over a trailing window (default 1h).
    pub fn statistics(&self, kind: MetricKind, window: Option<Duration>) -> MetricStatistics {
        self.store
            .statistics(kind, window.unwrap_or(self.config.stats_window))
    }

    /// Mean of a kind over a trailing window; `None` without samples.
    pub fn window_mean(&self, kind: MetricKind, window: Duration) -> Option<f64> {
        let stats = self.store.statistics(kind, window);
        (stats.count > 0).then_some(stats.mean)
    }

    /// Sets the warning/critical thresholds for one metric kind.
    pub fn set_threshold(&self, kind: MetricKind, warning: f64, critical: f64) {
        self.lock_alerts()
            .set_threshold(kind, Threshold { warning, critical });
    }

    /// Returns the configured threshold for a kind, if any.
    pub fn threshold(&self, kind: MetricKind) -> Option<Threshold> {
        self.lock_alerts().threshold(kind)
    }

    /// Evaluates latest values against thresholds; returns newly raised
    /// alerts. Duplicate unresolved alerts within the cooldown are
    /// suppressed.
    pub fn check_alerts(&self) -> Vec<Alert> {
        // ErrorRate alerts compare the windowed rate, not a raw 0/1 sample.
        let mut latest = self.store.current();
        if let Some(rate) = self.window_mean(MetricKind::ErrorRate, self.config.stats_window) {
            latest.insert(MetricKind::ErrorRate, rate);
        }

        let raised = self.lock_alerts().check(&latest);
        for alert in &raised {
            warn!(kind = %alert.kind, level = %alert.level, value = alert.value, "Raised alert");
        }
        raised
    }

    /// All unresolved alerts.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.lock_alerts().active()
    }

    /// Every alert raised since startup, resolved or not.
    pub fn alert_history(&self) -> Vec<Alert> {
        self.lock_alerts().all().to_vec()
    }

    /// Resolves an alert by id.
    pub fn resolve(&self, alert_id: u64) -> Result<(), MonitorError> {
        if self.lock_alerts().resolve(alert_id) {
            Ok(())
        } else {
            Err(MonitorError::AlertNotFound(alert_id))
        }
    }

    /// Generates optimization suggestions from the latest values.
    pub fn suggest(&self) -> Vec<OptimizationSuggestion> {
        let mut latest = self.store.current();
        if let Some(rate) = self.window_mean(MetricKind::ErrorRate, self.config.stats_window) {
            latest.insert(MetricKind::ErrorRate, rate);
        }
        suggest::generate(&latest)
    }

    /// Builds a report over a trailing window (default 1h).
    pub fn report(&self, window: Option<Duration>) -> PerformanceReport {
        let window = window.unwrap_or(self.config.stats_window);
        let end = Utc::now();
        let start = end
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut statistics = HashMap::new();
        for &kind in MetricKind::all() {
            let stats = self.store.statistics(kind, window);
            if stats.count > 0 {
                statistics.insert(kind, stats);
            }
        }

        let mut latest = self.store.current();
        if let Some(rate) = self.window_mean(MetricKind::ErrorRate, window) {
            latest.insert(MetricKind::ErrorRate, rate);
        }
        let score = health_score(&latest);

        PerformanceReport {
            start,
            end,
            statistics,
            alerts: self.active_alerts(),
            suggestions: self.suggest(),
            health_score: score,
            health: health_label(&latest),
        }
    }

    /// Interval the monitoring pass should run at.
    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    fn lock_alerts(&self) -> std::sync::MutexGuard<'_, AlertState> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_current() {
        let monitor = PerformanceMonitor::default();
        monitor.record(MetricKind::CpuUsage, 42.0, None, None);

        assert_eq!(monitor.latest(MetricKind::CpuUsage), Some(42.0));
        assert_eq!(monitor.current()[&MetricKind::CpuUsage], 42.0);
    }

    #[test]
    fn test_job_outcome_derives_two_metrics() {
        let monitor = PerformanceMonitor::default();
        monitor.record_job_outcome(true, Duration::from_millis(150), None);
        monitor.record_job_outcome(false, Duration::from_millis(50), None);

        let latency = monitor.statistics(MetricKind::JobLatency, None);
        assert_eq!(latency.count, 2);

        let error_rate = monitor.window_mean(MetricKind::ErrorRate, DEFAULT_STATS_WINDOW);
        assert_eq!(error_rate, Some(0.5));
    }

    #[test]
    fn test_check_alerts_on_cpu() {
        let monitor = PerformanceMonitor::default();
        monitor.record_system_sample(95.0, 40.0);

        let raised = monitor.check_alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, MetricKind::CpuUsage);
        assert_eq!(monitor.active_alerts().len(), 1);
    }

    #[test]
    fn test_resolve_alert() {
        let monitor = PerformanceMonitor::default();
        monitor.record_system_sample(95.0, 40.0);
        let raised = monitor.check_alerts();

        monitor.resolve(raised[0].id).unwrap();
        assert!(monitor.active_alerts().is_empty());
        // Resolved alerts stay in the history.
        assert_eq!(monitor.alert_history().len(), 1);

        let err = monitor.resolve(999_999).unwrap_err();
        assert!(matches!(err, MonitorError::AlertNotFound(_)));
    }

    #[test]
    fn test_error_rate_alert_uses_windowed_rate() {
        let monitor = PerformanceMonitor::default();
        // 3 failures out of 10: rate 0.3, above the 0.25 critical default.
        for i in 0..10 {
            monitor.record_job_outcome(i >= 3, Duration::from_millis(10), None);
        }

        let raised = monitor.check_alerts();
        assert!(raised
            .iter()
            .any(|a| a.kind == MetricKind::ErrorRate && a.level == super::super::AlertLevel::Critical));
    }

    #[test]
    fn test_suggest_decrease_workers_on_sustained_high_cpu() {
        let monitor = PerformanceMonitor::default();
        for _ in 0..5 {
            monitor.record_system_sample(85.0, 40.0);
        }

        let suggestions = monitor.suggest();
        let decrease = suggestions
            .iter()
            .find(|s| s.action == super::super::SuggestionAction::DecreaseWorkers)
            .expect("expected a decrease-workers suggestion");
        assert!(decrease.priority >= 8);
    }

    #[test]
    fn test_report_with_no_samples() {
        let monitor = PerformanceMonitor::default();
        let report = monitor.report(None);

        assert!(report.statistics.is_empty());
        assert!(report.alerts.is_empty());
        assert_eq!(report.health_score, 100.0);
    }

    #[test]
    fn test_report_health_degrades() {
        let monitor = PerformanceMonitor::default();
        monitor.record_system_sample(95.0, 96.0);
        monitor.record_cache_sample(0.3, 1024);

        let report = monitor.report(None);
        assert!(report.health_score < 60.0);
        assert!(!report.statistics.is_empty());
        assert!(report.format().contains("Performance Report"));
    }

    #[test]
    fn test_set_threshold_overrides_default() {
        let monitor = PerformanceMonitor::default();
        monitor.set_threshold(MetricKind::CpuUsage, 10.0, 20.0);
        monitor.record_system_sample(15.0, 40.0);

        let raised = monitor.check_alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, super::super::AlertLevel::Warning);
    }
}
