//! JobForge - adaptive scheduling, caching, and monitoring for recurring
//! data jobs.
//!
//! This library ingests independent units of work, ranks their sources by
//! business priority and resource cost, executes them on a bounded,
//! self-adjusting worker pool, caches results to avoid repeat work, and
//! continuously monitors throughput/latency/error metrics to retune
//! itself: priority scoring → scheduling/execution → caching → monitoring
//! → feedback.
//!
//! # High-Level API
//!
//! The [`runtime`] module provides the orchestrated facade:
//!
//! ```ignore
//! use jobforge::runtime::{Runtime, RuntimeConfig};
//! use jobforge::scheduler::{work_fn, SubmitOptions};
//!
//! let runtime = Runtime::new(RuntimeConfig::default());
//! runtime.start();
//!
//! let scheduler = runtime.scheduler();
//! let id = scheduler
//!     .submit(work_fn(|_| async { Ok(Some(b"result".to_vec())) }), SubmitOptions::default())
//!     .await;
//! let outcomes = scheduler.await_completion(&[id], None).await;
//!
//! runtime.shutdown().await;
//! ```
//!
//! The components can also be constructed individually: see
//! [`scheduler::JobScheduler`], [`cache::Cache`],
//! [`priority::PriorityManager`], and [`monitor::PerformanceMonitor`].

pub mod cache;
pub mod logging;
pub mod monitor;
pub mod priority;
pub mod runtime;
pub mod scheduler;

/// Version of the jobforge library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
