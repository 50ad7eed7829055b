//! Background maintenance loops for the cache.
//!
//! Two cancellable loops run for the process lifetime: a maintenance loop
//! (expired-entry sweep plus the adaptive strategy pass) and a preload loop.
//! Loop failures never stop the loop; each pass is independent and errors
//! are logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::store::Cache;

/// How often the preload loop polls for due preloaders.
///
/// Individual preloaders still honor their own registered intervals; this
/// only bounds how quickly a newly due preloader is noticed.
pub const PRELOAD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Spawns the expiry-sweep/adaptive maintenance loop.
///
/// The loop runs until `shutdown` is cancelled and sleeps the cache's
/// configured maintenance interval between passes.
pub fn spawn_maintenance_loop(cache: Arc<Cache>, shutdown: CancellationToken) -> JoinHandle<()> {
    let interval = cache.maintenance_interval();
    tokio::spawn(async move {
        debug!(interval_secs = interval.as_secs(), "Cache maintenance loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let swept = cache.remove_expired();
            if swept > 0 {
                debug!(swept, "Cache maintenance pass removed expired entries");
            }
            cache.adaptive_pass();
        }
        debug!("Cache maintenance loop stopped");
    })
}

/// Spawns the preload loop.
///
/// The loop runs until `shutdown` is cancelled, invoking every due
/// preloader each poll. Preload failures are logged inside
/// [`Cache::run_due_preloads`] and never abort the loop.
pub fn spawn_preload_loop(cache: Arc<Cache>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Cache preload loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(PRELOAD_POLL_INTERVAL) => {}
            }
            cache.run_due_preloads();
        }
        debug!("Cache preload loop stopped");
    })
}
