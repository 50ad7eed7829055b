//! Cache preloading (warm-up) registrations.
//!
//! Callers register named functions that produce entries to warm; the
//! preload loop invokes each one on its own interval. Preload failures are
//! logged and never propagated to callers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One entry produced by a preload function.
#[derive(Debug, Clone)]
pub struct PreloadEntry {
    /// Key to warm.
    pub key: String,
    /// Value to insert.
    pub value: Vec<u8>,
    /// Optional TTL for the warmed entry.
    pub ttl: Option<Duration>,
    /// Optional tags for the warmed entry.
    pub tags: Option<HashSet<String>>,
}

/// Signature of a preload function.
///
/// Returns the entries to insert, or an error message that is logged by the
/// preload loop.
pub type PreloadFn = Arc<dyn Fn() -> Result<Vec<PreloadEntry>, String> + Send + Sync>;

/// A registered preloader.
pub(crate) struct Preloader {
    /// Name used in logs.
    pub(crate) name: String,
    /// Interval between runs.
    pub(crate) interval: Duration,
    /// The preload function.
    pub(crate) f: PreloadFn,
    /// When the preloader last ran; `None` until the first run.
    last_run: Option<Instant>,
}

impl Preloader {
    pub(crate) fn new(name: String, interval: Duration, f: PreloadFn) -> Self {
        Self {
            name,
            interval,
            f,
            last_run: None,
        }
    }

    /// True when the preloader has never run or its interval has elapsed.
    pub(crate) fn is_due(&self) -> bool {
        match self.last_run {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        }
    }

    /// Stamps the preloader as having just run.
    pub(crate) fn mark_ran(&mut self) {
        self.last_run = Some(Instant::now());
    }
}
