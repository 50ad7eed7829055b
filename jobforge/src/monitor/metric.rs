//! Metric samples and the fixed-capacity ring store.
//!
//! Samples are append-only: each metric kind keeps a bounded ring of recent
//! samples and silently drops the oldest when full. Statistics are computed
//! over a trailing time window on demand.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Samples retained per metric kind.
pub const METRIC_RING_CAPACITY: usize = 1024;

/// Default trailing window for statistics.
pub const DEFAULT_STATS_WINDOW: Duration = Duration::from_secs(3600);

/// Kinds of metrics the monitor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// System CPU utilization, 0–100.
    CpuUsage,
    /// System memory utilization, 0–100.
    MemoryUsage,
    /// Per-job execution latency in milliseconds.
    JobLatency,
    /// Completed jobs per second.
    Throughput,
    /// Job failure rate, 0.0–1.0 (recorded as 0/1 samples).
    ErrorRate,
    /// Cache hit rate, 0.0–1.0.
    CacheHitRate,
    /// Cache size in bytes.
    CacheSize,
    /// Scheduler queue depth.
    QueueDepth,
}

impl MetricKind {
    /// Returns the metric name for logging and tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::CpuUsage => "cpu_usage",
            MetricKind::MemoryUsage => "memory_usage",
            MetricKind::JobLatency => "job_latency",
            MetricKind::Throughput => "throughput",
            MetricKind::ErrorRate => "error_rate",
            MetricKind::CacheHitRate => "cache_hit_rate",
            MetricKind::CacheSize => "cache_size",
            MetricKind::QueueDepth => "queue_depth",
        }
    }

    /// All known metric kinds.
    pub fn all() -> &'static [MetricKind] {
        &[
            MetricKind::CpuUsage,
            MetricKind::MemoryUsage,
            MetricKind::JobLatency,
            MetricKind::Throughput,
            MetricKind::ErrorRate,
            MetricKind::CacheHitRate,
            MetricKind::CacheSize,
            MetricKind::QueueDepth,
        ]
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded sample.
#[derive(Debug, Clone)]
pub struct Metric {
    /// What was measured.
    pub kind: MetricKind,
    /// Sample value.
    pub value: f64,
    /// When the sample was taken.
    pub at: Instant,
    /// Optional originating component or job source.
    pub source: Option<String>,
    /// Optional free-form tags.
    pub tags: HashMap<String, String>,
}

/// Summary statistics over a window of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricStatistics {
    /// Samples in the window.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median value.
    pub median: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl MetricStatistics {
    fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;

        let median = if count % 2 == 0 {
            (values[count / 2 - 1] + values[count / 2]) / 2.0
        } else {
            values[count / 2]
        };

        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            count,
            mean,
            median,
            min: values[0],
            max: values[count - 1],
            std_dev: variance.sqrt(),
        }
    }
}

/// Fixed-capacity ring store, one ring per metric kind.
pub(crate) struct MetricStore {
    rings: Mutex<HashMap<MetricKind, VecDeque<Metric>>>,
    capacity: usize,
}

impl MetricStore {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Appends a sample, dropping the oldest when the ring is full.
    pub(crate) fn record(&self, metric: Metric) {
        let mut rings = self.lock();
        let ring = rings.entry(metric.kind).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(metric);
    }

    /// Latest sample value per kind.
    pub(crate) fn current(&self) -> HashMap<MetricKind, f64> {
        let rings = self.lock();
        rings
            .iter()
            .filter_map(|(kind, ring)| ring.back().map(|m| (*kind, m.value)))
            .collect()
    }

    /// Latest sample value for one kind.
    pub(crate) fn latest(&self, kind: MetricKind) -> Option<f64> {
        let rings = self.lock();
        rings.get(&kind).and_then(|ring| ring.back()).map(|m| m.value)
    }

    /// Values within the trailing window for one kind.
    pub(crate) fn window_values(&self, kind: MetricKind, window: Duration) -> Vec<f64> {
        let cutoff = Instant::now().checked_sub(window);
        let rings = self.lock();
        rings
            .get(&kind)
            .map(|ring| {
                ring.iter()
                    .filter(|m| match cutoff {
                        Some(cutoff) => m.at >= cutoff,
                        None => true,
                    })
                    .map(|m| m.value)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Statistics over the trailing window for one kind.
    pub(crate) fn statistics(&self, kind: MetricKind, window: Duration) -> MetricStatistics {
        MetricStatistics::from_values(self.window_values(kind, window))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MetricKind, VecDeque<Metric>>> {
        self.rings.lock().unwrap_or_else(|e| e.into_inner())
    }
}
