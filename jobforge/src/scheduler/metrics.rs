//! Lock-free scheduler metrics.
//!
//! Counters use atomics with `Relaxed` ordering: individual measurements
//! are independent and only read through point-in-time snapshots.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time snapshot of aggregate scheduler metrics.
#[derive(Debug, Clone, Default)]
pub struct ProcessingMetrics {
    /// Jobs accepted by `submit`/`submit_batch`.
    pub submitted: u64,
    /// Jobs that reached `Completed`.
    pub completed: u64,
    /// Jobs that reached `Failed`.
    pub failed: u64,
    /// Jobs that reached `Cancelled`.
    pub cancelled: u64,
    /// Retry attempts scheduled.
    pub retried: u64,
    /// Total execution attempts (first runs plus retries).
    pub total_attempts: u64,
    /// Jobs waiting in the queue.
    pub pending: usize,
    /// Jobs currently executing on workers.
    pub running: usize,
    /// Completed / (completed + failed); 1.0 before any terminal job.
    pub success_rate: f64,
    /// Mean per-attempt execution time in milliseconds.
    pub avg_processing_ms: f64,
    /// Completed jobs per second since startup.
    pub throughput_per_sec: f64,
    /// Highest throughput observed at any snapshot.
    pub peak_throughput_per_sec: f64,
}

/// Atomic metric recorder for the scheduler.
pub(crate) struct SchedulerMetrics {
    start_time: Instant,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retried: AtomicU64,
    attempts: AtomicU64,
    running: AtomicUsize,
    /// Total per-attempt execution time in microseconds.
    processing_time_us: AtomicU64,
    /// Attempts contributing to `processing_time_us`.
    timed_attempts: AtomicU64,
    /// Peak throughput in jobs per second, stored ×1000 for integer CAS.
    peak_throughput_milli: AtomicU64,
}

impl SchedulerMetrics {
    pub(crate) fn new() -> Self {
        Self {
            start_time: Instant::now(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            running: AtomicUsize::new(0),
            processing_time_us: AtomicU64::new(0),
            timed_attempts: AtomicU64::new(0),
            peak_throughput_milli: AtomicU64::new(0),
        }
    }

    pub(crate) fn job_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attempt_started(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attempt_finished(&self, duration: Duration) {
        self.running.fetch_sub(1, Ordering::Relaxed);
        self.processing_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.timed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot; `pending` is the current queue depth, supplied by
    /// the scheduler.
    pub(crate) fn snapshot(&self, pending: usize) -> ProcessingMetrics {
        let uptime_secs = self.start_time.elapsed().as_secs_f64().max(0.001);

        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let terminal = completed + failed;
        let success_rate = if terminal == 0 {
            1.0
        } else {
            completed as f64 / terminal as f64
        };

        let timed_attempts = self.timed_attempts.load(Ordering::Relaxed);
        let avg_processing_ms = if timed_attempts == 0 {
            0.0
        } else {
            self.processing_time_us.load(Ordering::Relaxed) as f64
                / timed_attempts as f64
                / 1000.0
        };

        let throughput = completed as f64 / uptime_secs;

        // Peak tracking via CAS loop.
        let current_milli = (throughput * 1000.0) as u64;
        let mut peak = self.peak_throughput_milli.load(Ordering::Relaxed);
        while current_milli > peak {
            match self.peak_throughput_milli.compare_exchange_weak(
                peak,
                current_milli,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
        let peak_throughput =
            self.peak_throughput_milli.load(Ordering::Relaxed) as f64 / 1000.0;

        ProcessingMetrics {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed,
            failed,
            cancelled: self.cancelled.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            total_attempts: self.attempts.load(Ordering::Relaxed),
            pending,
            running: self.running.load(Ordering::Relaxed),
            success_rate,
            avg_processing_ms,
            throughput_per_sec: throughput,
            peak_throughput_per_sec: peak_throughput,
        }
    }
}

/// Point-in-time snapshot of one worker's counters.
#[derive(Debug, Clone, Default)]
pub struct WorkerMetrics {
    /// Worker identifier.
    pub worker_id: usize,
    /// Attempts this worker executed.
    pub jobs_processed: u64,
    /// Attempts that ended in failure on this worker.
    pub jobs_failed: u64,
    /// Total time this worker spent executing work.
    pub busy: Duration,
}

/// Atomic per-worker counters.
pub(crate) struct WorkerStats {
    pub(crate) worker_id: usize,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    busy_us: AtomicU64,
}

impl WorkerStats {
    pub(crate) fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            jobs_processed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            busy_us: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_attempt(&self, duration: Duration, failed: bool) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.busy_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> WorkerMetrics {
        WorkerMetrics {
            worker_id: self.worker_id,
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            busy: Duration::from_micros(self.busy_us.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_counters() {
        let metrics = SchedulerMetrics::new();

        metrics.job_submitted();
        metrics.attempt_started();
        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.submitted, 1);
        assert_eq!(snapshot.running, 1);
        assert_eq!(snapshot.total_attempts, 1);

        metrics.attempt_finished(Duration::from_millis(10));
        metrics.job_completed();
        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.running, 0);
        assert_eq!(snapshot.completed, 1);
        assert!(snapshot.avg_processing_ms > 0.0);
    }

    #[test]
    fn test_success_rate() {
        let metrics = SchedulerMetrics::new();
        assert_eq!(metrics.snapshot(0).success_rate, 1.0);

        metrics.job_completed();
        metrics.job_completed();
        metrics.job_completed();
        metrics.job_failed();
        let snapshot = metrics.snapshot(0);
        assert!((snapshot.success_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_peak_throughput_monotone() {
        let metrics = SchedulerMetrics::new();
        for _ in 0..100 {
            metrics.job_completed();
        }

        let first = metrics.snapshot(0);
        std::thread::sleep(Duration::from_millis(20));
        let second = metrics.snapshot(0);

        // Throughput decays with uptime but the peak never does.
        assert!(second.peak_throughput_per_sec >= first.throughput_per_sec * 0.99);
    }

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::new(7);
        stats.record_attempt(Duration::from_millis(5), false);
        stats.record_attempt(Duration::from_millis(5), true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.worker_id, 7);
        assert_eq!(snapshot.jobs_processed, 2);
        assert_eq!(snapshot.jobs_failed, 1);
        assert!(snapshot.busy >= Duration::from_millis(10));
    }

    #[test]
    fn test_pending_passthrough() {
        let metrics = SchedulerMetrics::new();
        assert_eq!(metrics.snapshot(42).pending, 42);
    }
}
