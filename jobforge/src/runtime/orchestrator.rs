//! Runtime orchestrator wiring the closed control loop.
//!
//! Constructs the four components explicitly (no process-wide globals) and
//! runs the background loops for the process lifetime:
//!
//! 1. cache maintenance (expiry sweep + adaptive strategy pass)
//! 2. cache preload
//! 3. system resource sampling (feeds the monitor and the priority
//!    manager's resource-availability view)
//! 4. load balancing (queue-depth driven worker tuning)
//! 5. periodic priority review (error-rate demotions)
//! 6. monitoring pass (alert check + auto-applied suggestions)
//!
//! Every loop selects on a shared root `CancellationToken`; `shutdown`
//! cancels it and waits for each loop to observe the cancellation and
//! exit, then drains the scheduler: deterministic teardown, no reliance
//! on process exit. A failing pass is logged and the loop continues on its
//! next tick; a single bad pass never stops monitoring or cleanup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{spawn_maintenance_loop, spawn_preload_loop, Cache};
use crate::monitor::{
    MetricKind, PerformanceMonitor, SuggestionAction, SystemSampler, AUTO_APPLY_PRIORITY,
};
use crate::priority::{PriorityManager, ResourceKind};
use crate::scheduler::{JobScheduler, MAX_POOL_SIZE, MIN_POOL_SIZE};

use super::config::RuntimeConfig;

/// Queue depth per worker above which the load balancer grows the pool.
pub const BALANCE_GROW_FACTOR: usize = 4;

/// Owns the four core components and their background loops.
pub struct Runtime {
    scheduler: Arc<JobScheduler>,
    cache: Arc<Cache>,
    priorities: Arc<PriorityManager>,
    monitor: Arc<PerformanceMonitor>,
    intervals: super::config::LoopIntervals,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Runtime {
    /// Builds the components. Background loops start on [`Runtime::start`].
    ///
    /// Must be called inside a tokio runtime: the scheduler spawns its
    /// worker pool immediately.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            scheduler: Arc::new(JobScheduler::new(config.scheduler)),
            cache: Arc::new(Cache::new(config.cache)),
            priorities: Arc::new(PriorityManager::new(config.priority)),
            monitor: Arc::new(PerformanceMonitor::new(config.monitor)),
            intervals: config.intervals,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// The scheduler.
    pub fn scheduler(&self) -> Arc<JobScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// The cache.
    pub fn cache(&self) -> Arc<Cache> {
        Arc::clone(&self.cache)
    }

    /// The priority manager.
    pub fn priorities(&self) -> Arc<PriorityManager> {
        Arc::clone(&self.priorities)
    }

    /// The performance monitor.
    pub fn monitor(&self) -> Arc<PerformanceMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Spawns all background loops. Calling twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut tasks = self.lock_tasks();
        tasks.push(spawn_maintenance_loop(
            Arc::clone(&self.cache),
            self.shutdown.child_token(),
        ));
        tasks.push(spawn_preload_loop(
            Arc::clone(&self.cache),
            self.shutdown.child_token(),
        ));
        tasks.push(self.spawn_sampling_loop());
        tasks.push(self.spawn_balance_loop());
        tasks.push(self.spawn_priority_review_loop());
        tasks.push(self.spawn_monitoring_loop());
        info!("Runtime background loops started");
    }

    /// Cancels every loop, waits for each to exit, then drains the
    /// scheduler's worker pool.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.lock_tasks();
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background loop panicked during shutdown");
            }
        }
        self.scheduler.shutdown().await;
        info!("Runtime shut down");
    }

    /// System sampling: records CPU/memory into the monitor, refreshes the
    /// priority manager's resource availability, and piggybacks cache and
    /// scheduler gauges.
    fn spawn_sampling_loop(&self) -> JoinHandle<()> {
        let monitor = Arc::clone(&self.monitor);
        let priorities = Arc::clone(&self.priorities);
        let cache = Arc::clone(&self.cache);
        let scheduler = Arc::clone(&self.scheduler);
        let shutdown = self.shutdown.child_token();
        let interval = self.intervals.sample;

        tokio::spawn(async move {
            let sampler = SystemSampler::new();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if let Some(sample) = sampler.sample() {
                    monitor.record_system_sample(sample.cpu_usage, sample.memory_usage);
                    priorities.set_resource_availability(
                        ResourceKind::Cpu,
                        1.0 - sample.cpu_usage / 100.0,
                    );
                    priorities.set_resource_availability(
                        ResourceKind::Memory,
                        1.0 - sample.memory_usage / 100.0,
                    );
                }

                let stats = cache.stats();
                monitor.record_cache_sample(stats.hit_rate(), stats.size_bytes);

                let metrics = scheduler.metrics();
                monitor.record(
                    MetricKind::QueueDepth,
                    metrics.pending as f64,
                    None,
                    None,
                );
                monitor.record(
                    MetricKind::Throughput,
                    metrics.throughput_per_sec,
                    None,
                    None,
                );
            }
            debug!("Sampling loop stopped");
        })
    }

    /// Load balancing: grows the pool when the queue backs up, shrinks it
    /// when workers sit idle.
    fn spawn_balance_loop(&self) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self.scheduler);
        let shutdown = self.shutdown.child_token();
        let interval = self.intervals.balance;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let pool = scheduler.pool_size();
                let metrics = scheduler.metrics();

                let target = if metrics.pending > pool * BALANCE_GROW_FACTOR {
                    (pool + 1).min(MAX_POOL_SIZE)
                } else if metrics.pending == 0 && metrics.running * 2 < pool {
                    (pool - 1).max(MIN_POOL_SIZE)
                } else {
                    pool
                };

                if target != pool {
                    debug!(
                        pending = metrics.pending,
                        running = metrics.running,
                        from = pool,
                        to = target,
                        "Load balancer retuning pool"
                    );
                    if let Err(e) = scheduler.resize_pool(target) {
                        warn!(error = %e, "Load balancer resize failed");
                    }
                }
            }
            debug!("Load balancing loop stopped");
        })
    }

    /// Periodic error-rate review on registered sources.
    fn spawn_priority_review_loop(&self) -> JoinHandle<()> {
        let priorities = Arc::clone(&self.priorities);
        let shutdown = self.shutdown.child_token();
        let interval = self.intervals.priority_review;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let adjusted = priorities.review_error_rates();
                if !adjusted.is_empty() {
                    debug!(sources = ?adjusted, "Priority review demoted sources");
                }
            }
            debug!("Priority review loop stopped");
        })
    }

    /// Monitoring pass: checks alerts, then applies suggestions with
    /// priority ≥ 8 back into the scheduler. Lower-priority suggestions
    /// are reported only.
    fn spawn_monitoring_loop(&self) -> JoinHandle<()> {
        let monitor = Arc::clone(&self.monitor);
        let scheduler = Arc::clone(&self.scheduler);
        let shutdown = self.shutdown.child_token();
        let interval = self.monitor.check_interval();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let _ = monitor.check_alerts();
                auto_tune(&monitor, &scheduler);
            }
            debug!("Monitoring loop stopped");
        })
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Applies high-priority suggestions. Suggestions below
/// [`AUTO_APPLY_PRIORITY`] are logged for operators but not acted on.
pub(crate) fn auto_tune(monitor: &PerformanceMonitor, scheduler: &JobScheduler) {
    for suggestion in monitor.suggest() {
        if suggestion.priority < AUTO_APPLY_PRIORITY {
            debug!(
                action = %suggestion.action,
                priority = suggestion.priority,
                reason = %suggestion.reason,
                "Suggestion reported (not auto-applied)"
            );
            continue;
        }

        match suggestion.action {
            SuggestionAction::DecreaseWorkers => {
                let target = scheduler.pool_size().saturating_sub(1).max(MIN_POOL_SIZE);
                match scheduler.resize_pool(target) {
                    Ok(()) => info!(target, reason = %suggestion.reason, "Auto-tune shrank pool"),
                    Err(e) => warn!(error = %e, "Auto-tune resize failed"),
                }
            }
            SuggestionAction::AdjustRetryPolicy => {
                let target = scheduler.default_max_retries().saturating_sub(1).max(1);
                scheduler.set_default_max_retries(target);
                info!(target, reason = %suggestion.reason, "Auto-tune reduced default retries");
            }
            other => {
                debug!(action = %other, "No auto-tune lever for suggestion");
            }
        }
    }
}
