//! Aggregate runtime configuration.
//!
//! All parameters are in-process values supplied at construction time;
//! there is no file-based configuration surface.

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::monitor::MonitorConfig;
use crate::priority::PriorityConfig;
use crate::scheduler::SchedulerConfig;

/// Default interval between system resource samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

/// Default interval between load-balancing passes.
pub const DEFAULT_BALANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between periodic priority reviews.
pub const DEFAULT_PRIORITY_REVIEW_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the whole runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Scheduler configuration.
    pub scheduler: SchedulerConfig,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Priority manager configuration.
    pub priority: PriorityConfig,
    /// Monitor configuration.
    pub monitor: MonitorConfig,
    /// Background loop intervals.
    pub intervals: LoopIntervals,
}

/// Intervals for the runtime's background loops.
#[derive(Debug, Clone)]
pub struct LoopIntervals {
    /// System resource sampling.
    pub sample: Duration,
    /// Queue-depth driven worker tuning.
    pub balance: Duration,
    /// Periodic source error-rate review.
    pub priority_review: Duration,
}

impl Default for LoopIntervals {
    fn default() -> Self {
        Self {
            sample: DEFAULT_SAMPLE_INTERVAL,
            balance: DEFAULT_BALANCE_INTERVAL,
            priority_review: DEFAULT_PRIORITY_REVIEW_INTERVAL,
        }
    }
}
