//! Performance monitoring: metrics, alerts, suggestions, and reports.
//!
//! The monitor records samples emitted by the scheduler, cache, and system
//! sampler into fixed-capacity rings, evaluates threshold alerts, computes
//! a deduction-based health score, and generates the optimization
//! suggestions that close the feedback loop (worker-pool resizing, cache
//! resizing, retry-policy changes).

mod alert;
mod metric;
#[allow(clippy::module_inception)]
mod monitor;
mod report;
mod sampler;
mod suggest;

pub use alert::{Alert, AlertLevel, Threshold, DEFAULT_ALERT_COOLDOWN};
pub use metric::{
    Metric, MetricKind, MetricStatistics, DEFAULT_STATS_WINDOW, METRIC_RING_CAPACITY,
};
pub use monitor::{MonitorConfig, MonitorError, PerformanceMonitor, DEFAULT_CHECK_INTERVAL};
pub use report::{health_label, health_score, HealthLabel, PerformanceReport};
pub use sampler::{SystemSample, SystemSampler};
pub use suggest::{
    OptimizationSuggestion, SuggestionAction, AUTO_APPLY_PRIORITY, CACHE_HIT_RATE_FLOOR,
    CPU_HIGH_WATERMARK, CPU_LOW_WATERMARK, ERROR_RATE_CEILING,
};
