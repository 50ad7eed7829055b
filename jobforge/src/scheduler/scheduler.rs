//! Job scheduler: a resizable worker pool over a bounded priority queue.
//!
//! Workers are tokio tasks popping the shared queue; each worker carries its
//! own cancellation token so the pool can drain and respawn individual
//! workers without dropping accepted jobs. Retries wait out their backoff on
//! a separate timer task, never occupying a worker slot. Every terminal
//! transition updates the aggregate metrics, and per-job status flows
//! through a watch channel that `await_completion` selects on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::{JobId, JobOutcome, JobStatus, SubmitOptions, Work, WorkError};
use super::metrics::{ProcessingMetrics, SchedulerMetrics, WorkerMetrics, WorkerStats};
use super::queue::{JobQueue, QueuedJob};
use crate::priority::PriorityLevel;

/// Smallest allowed worker pool.
pub const MIN_POOL_SIZE: usize = 1;

/// Largest allowed worker pool.
pub const MAX_POOL_SIZE: usize = 50;

/// Default worker pool size.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default queue capacity before submission backpressure kicks in.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default maximum retries for jobs submitted without an explicit value.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ceiling on the exponential retry backoff.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// In-flight jobs allowed per batch call, as a multiple of the pool size.
pub const BATCH_INFLIGHT_MULTIPLIER: usize = 2;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Initial worker pool size, clamped to `[MIN_POOL_SIZE, MAX_POOL_SIZE]`.
    pub pool_size: usize,
    /// Queue capacity; submissions beyond it wait for space.
    pub queue_capacity: usize,
    /// Retries for jobs submitted without an explicit max-retries.
    pub default_max_retries: u32,
    /// Per-attempt timeout for jobs submitted without an explicit timeout.
    pub default_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_timeout: None,
        }
    }
}

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A requested pool size fell outside `[MIN_POOL_SIZE, MAX_POOL_SIZE]`.
    #[error("pool size {requested} outside allowed range [{min}, {max}]")]
    InvalidPoolSize {
        /// The rejected size.
        requested: usize,
        /// Smallest allowed size.
        min: usize,
        /// Largest allowed size.
        max: usize,
    },

    /// No job with the given id is known to the scheduler.
    #[error("unknown job: {0}")]
    JobNotFound(JobId),
}

/// Exponential backoff before retry `retry_count + 1`: `min(2^retries, 60s)`.
pub fn retry_backoff(retry_count: u32) -> Duration {
    let secs = 2u64
        .saturating_pow(retry_count)
        .min(MAX_RETRY_BACKOFF.as_secs());
    Duration::from_secs(secs)
}

/// Mutable per-job state. All status transitions happen while holding this
/// lock so terminal states stay sticky under concurrent finishers.
#[derive(Default)]
struct JobState {
    terminal: bool,
    started_at: Option<Instant>,
    result: Option<Vec<u8>>,
    error: Option<String>,
    processing_time: Duration,
    /// Held while the job belongs to an in-flight batch window.
    batch_permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

/// One tracked job.
struct JobEntry {
    id: JobId,
    label: String,
    priority: PriorityLevel,
    work: Arc<dyn Work>,
    max_retries: u32,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
    status_tx: watch::Sender<JobStatus>,
    retry_count: AtomicU32,
    state: Mutex<JobState>,
}

impl JobEntry {
    fn lock_state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }
}

struct WorkerHandle {
    id: usize,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    queue: JobQueue,
    jobs: DashMap<JobId, Arc<JobEntry>>,
    completed: DashMap<JobId, Arc<JobEntry>>,
    metrics: SchedulerMetrics,
    worker_stats: DashMap<usize, Arc<WorkerStats>>,
    workers: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicUsize,
    submit_seq: AtomicU64,
    default_max_retries: AtomicU32,
    default_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl SchedulerInner {
    fn lock_workers(&self) -> MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Priority-ordered job executor with a resizable worker pool.
///
/// Must be created inside a running tokio runtime: workers are spawned on
/// construction.
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    /// Creates a scheduler and spawns its initial worker pool.
    pub fn new(config: SchedulerConfig) -> Self {
        let pool_size = config.pool_size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE);
        let inner = Arc::new(SchedulerInner {
            queue: JobQueue::new(config.queue_capacity),
            jobs: DashMap::new(),
            completed: DashMap::new(),
            metrics: SchedulerMetrics::new(),
            worker_stats: DashMap::new(),
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
            submit_seq: AtomicU64::new(0),
            default_max_retries: AtomicU32::new(config.default_max_retries),
            default_timeout: config.default_timeout,
            shutdown: CancellationToken::new(),
        });

        {
            let mut workers = inner.lock_workers();
            for _ in 0..pool_size {
                Self::spawn_worker(&inner, &mut workers);
            }
        }
        info!(pool_size, "Scheduler started");

        Self { inner }
    }

    /// Submits one unit of work. Waits only when the queue is at capacity.
    pub async fn submit(&self, work: Arc<dyn Work>, opts: SubmitOptions) -> JobId {
        self.submit_with_permit(work, opts, None).await
    }

    /// Submits a batch of jobs, returning their ids in submission order.
    ///
    /// No more than `2 × pool_size` jobs from one batch call are in flight
    /// (submitted but not terminal) at a time; later entries wait for
    /// earlier ones to finish before entering the queue.
    pub async fn submit_batch(
        &self,
        batch: Vec<(Arc<dyn Work>, SubmitOptions)>,
    ) -> Vec<JobId> {
        let window = self.pool_size().max(1) * BATCH_INFLIGHT_MULTIPLIER;
        let gate = Arc::new(Semaphore::new(window));
        let mut ids = Vec::with_capacity(batch.len());

        for (work, opts) in batch {
            let permit = Arc::clone(&gate)
                .acquire_owned()
                .await
                .expect("batch gate never closed");
            ids.push(self.submit_with_permit(work, opts, Some(permit)).await);
        }
        ids
    }

    /// Waits for the given jobs to reach a terminal state.
    ///
    /// Returns one outcome per id. When `timeout` elapses first, jobs still
    /// outstanding are reported with their current non-terminal status:
    /// the await gives up waiting, the jobs keep running.
    pub async fn await_completion(
        &self,
        ids: &[JobId],
        timeout: Option<Duration>,
    ) -> HashMap<JobId, JobOutcome> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut outcomes = HashMap::with_capacity(ids.len());

        for &id in ids {
            let Some(entry) = self.lookup(id) else {
                outcomes.insert(
                    id,
                    JobOutcome {
                        job_id: id,
                        status: JobStatus::Failed,
                        result: None,
                        error: Some(SchedulerError::JobNotFound(id).to_string()),
                        attempts: 0,
                        processing_time: None,
                    },
                );
                continue;
            };

            let mut rx = entry.status_tx.subscribe();
            let wait = rx.wait_for(|status| status.is_terminal());
            match deadline {
                Some(deadline) => {
                    let _ = tokio::time::timeout_at(deadline, wait).await;
                }
                None => {
                    let _ = wait.await;
                }
            }
            outcomes.insert(id, Self::outcome_of(&entry));
        }
        outcomes
    }

    /// Cancels a job.
    ///
    /// Returns `true` only when cancellation is guaranteed: the job had not
    /// started (removed from the queue path) or was waiting out a retry
    /// backoff. For running jobs the per-job token is triggered and `false`
    /// is returned; cooperative work observes the token and ends
    /// `Cancelled`; non-cooperative work completes normally.
    pub fn cancel(&self, id: JobId) -> bool {
        let Some(entry) = self.inner.jobs.get(&id).map(|e| Arc::clone(e.value())) else {
            return false;
        };

        match entry.status() {
            JobStatus::Pending => {
                entry.cancellation.cancel();
                Self::finish_job(&self.inner, &entry, JobStatus::Cancelled, None, None);
                true
            }
            JobStatus::Retrying => {
                // The retry timer observes the token and finishes the job.
                entry.cancellation.cancel();
                true
            }
            JobStatus::Running => {
                entry.cancellation.cancel();
                false
            }
            _ => false,
        }
    }

    /// Resizes the worker pool to `size` workers.
    ///
    /// Safe to call with work in flight: grown pools spawn fresh workers;
    /// shrunk pools cancel individual workers, which finish their current
    /// job and exit without touching queued jobs.
    pub fn resize_pool(&self, size: usize) -> Result<(), SchedulerError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size) {
            return Err(SchedulerError::InvalidPoolSize {
                requested: size,
                min: MIN_POOL_SIZE,
                max: MAX_POOL_SIZE,
            });
        }

        let mut workers = self.inner.lock_workers();
        let before = workers.len();
        while workers.len() < size {
            Self::spawn_worker(&self.inner, &mut workers);
        }
        while workers.len() > size {
            if let Some(worker) = workers.pop() {
                worker.cancel.cancel();
                debug!(worker_id = worker.id, "Draining worker");
            }
        }
        if before != size {
            info!(from = before, to = size, "Resized worker pool");
        }
        Ok(())
    }

    /// Current worker pool size.
    pub fn pool_size(&self) -> usize {
        self.inner.lock_workers().len()
    }

    /// Current queue depth.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.len()
    }

    /// Snapshot of aggregate metrics.
    pub fn metrics(&self) -> ProcessingMetrics {
        self.inner.metrics.snapshot(self.inner.queue.len())
    }

    /// Snapshot of per-worker metrics, keyed by worker id.
    pub fn worker_metrics(&self) -> HashMap<usize, WorkerMetrics> {
        self.inner
            .worker_stats
            .iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }

    /// Current status of a job, if known.
    pub fn job_status(&self, id: JobId) -> Option<JobStatus> {
        self.lookup(id).map(|entry| entry.status())
    }

    /// Replaces the default max-retries applied to jobs submitted without
    /// an explicit value. Feedback lever for the monitor's retry-policy
    /// suggestion.
    pub fn set_default_max_retries(&self, retries: u32) {
        self.inner
            .default_max_retries
            .store(retries, Ordering::Relaxed);
        info!(retries, "Updated default retry policy");
    }

    /// Current default max-retries.
    pub fn default_max_retries(&self) -> u32 {
        self.inner.default_max_retries.load(Ordering::Relaxed)
    }

    /// Cancels all workers and waits for them to exit.
    ///
    /// Queued jobs are left unfinished; in-flight jobs complete their
    /// current attempt.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained: Vec<WorkerHandle> = {
            let mut workers = self.inner.lock_workers();
            workers.drain(..).collect()
        };
        for worker in drained {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                warn!(worker_id = worker.id, error = %e, "Worker task panicked");
            }
        }
        info!("Scheduler shut down");
    }

    fn lookup(&self, id: JobId) -> Option<Arc<JobEntry>> {
        self.inner
            .jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .or_else(|| self.inner.completed.get(&id).map(|e| Arc::clone(e.value())))
    }

    async fn submit_with_permit(
        &self,
        work: Arc<dyn Work>,
        opts: SubmitOptions,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) -> JobId {
        let id = JobId::new();
        let (status_tx, _status_rx) = watch::channel(JobStatus::Pending);
        let entry = Arc::new(JobEntry {
            id,
            label: opts.label.unwrap_or_else(|| id.to_string()),
            priority: opts.priority,
            work,
            max_retries: opts
                .max_retries
                .unwrap_or_else(|| self.default_max_retries()),
            timeout: opts.timeout.or(self.inner.default_timeout),
            cancellation: CancellationToken::new(),
            status_tx,
            retry_count: AtomicU32::new(0),
            state: Mutex::new(JobState {
                batch_permit: permit,
                ..JobState::default()
            }),
        });

        self.inner.jobs.insert(id, Arc::clone(&entry));
        self.inner.metrics.job_submitted();

        let seq = self.inner.submit_seq.fetch_add(1, Ordering::Relaxed);
        self.inner
            .queue
            .push(QueuedJob {
                priority: entry.priority,
                seq,
                id,
            })
            .await;
        debug!(job = %id, label = %entry.label, priority = %entry.priority, "Submitted job");
        id
    }

    fn spawn_worker(inner: &Arc<SchedulerInner>, workers: &mut Vec<WorkerHandle>) {
        let worker_id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let stats = Arc::new(WorkerStats::new(worker_id));
        inner.worker_stats.insert(worker_id, Arc::clone(&stats));

        let handle = tokio::spawn(Self::worker_loop(
            Arc::clone(inner),
            worker_id,
            cancel.clone(),
            stats,
        ));
        workers.push(WorkerHandle {
            id: worker_id,
            cancel,
            handle,
        });
        debug!(worker_id, "Spawned worker");
    }

    async fn worker_loop(
        inner: Arc<SchedulerInner>,
        worker_id: usize,
        cancel: CancellationToken,
        stats: Arc<WorkerStats>,
    ) {
        loop {
            let queued = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = inner.shutdown.cancelled() => break,
                queued = inner.queue.pop() => queued,
            };

            // Jobs already finished (cancelled while queued) leave a stale
            // queue slot behind; skip them.
            let Some(entry) = inner.jobs.get(&queued.id).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            Self::execute_attempt(&inner, &entry, &stats).await;
        }
        debug!(worker_id, "Worker stopped");
    }

    async fn execute_attempt(
        inner: &Arc<SchedulerInner>,
        entry: &Arc<JobEntry>,
        stats: &WorkerStats,
    ) {
        // Transition to Running under the state lock so a concurrent cancel
        // cannot be overwritten.
        {
            let mut state = entry.lock_state();
            if state.terminal {
                return;
            }
            if state.started_at.is_none() {
                state.started_at = Some(Instant::now());
            }
            entry.status_tx.send_replace(JobStatus::Running);
        }
        if entry.cancellation.is_cancelled() {
            Self::finish_job(inner, entry, JobStatus::Cancelled, None, None);
            return;
        }

        inner.metrics.attempt_started();
        let attempt = entry.retry_count.load(Ordering::Relaxed) + 1;
        let ctx = super::job::WorkContext::new(entry.cancellation.clone(), attempt);

        let started = Instant::now();
        let result = match entry.timeout {
            Some(limit) => match tokio::time::timeout(limit, entry.work.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(WorkError::new(format!(
                    "attempt timed out after {limit:?}"
                ))),
            },
            None => entry.work.execute(ctx).await,
        };
        let elapsed = started.elapsed();
        inner.metrics.attempt_finished(elapsed);
        {
            let mut state = entry.lock_state();
            state.processing_time += elapsed;
        }

        match result {
            Ok(output) => {
                stats.record_attempt(elapsed, false);
                Self::finish_job(inner, entry, JobStatus::Completed, output, None);
            }
            Err(err) => {
                stats.record_attempt(elapsed, true);
                if entry.cancellation.is_cancelled() {
                    Self::finish_job(
                        inner,
                        entry,
                        JobStatus::Cancelled,
                        None,
                        Some(err.to_string()),
                    );
                    return;
                }

                let retries = entry.retry_count.load(Ordering::Relaxed);
                if retries < entry.max_retries {
                    Self::schedule_retry(inner, entry, retries, err);
                } else {
                    Self::finish_job(inner, entry, JobStatus::Failed, None, Some(err.to_string()));
                }
            }
        }
    }

    /// Moves a failed job into `Retrying` and re-enqueues it after its
    /// backoff on a dedicated timer task.
    fn schedule_retry(
        inner: &Arc<SchedulerInner>,
        entry: &Arc<JobEntry>,
        retries: u32,
        err: WorkError,
    ) {
        {
            let mut state = entry.lock_state();
            if state.terminal {
                return;
            }
            entry.retry_count.fetch_add(1, Ordering::Relaxed);
            state.error = Some(err.to_string());
            entry.status_tx.send_replace(JobStatus::Retrying);
        }
        inner.metrics.job_retried();

        let delay = retry_backoff(retries);
        debug!(
            job = %entry.id,
            retry = retries + 1,
            delay_secs = delay.as_secs(),
            error = %err,
            "Scheduling retry"
        );

        let inner = Arc::clone(inner);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = entry.cancellation.cancelled() => {}
                _ = inner.shutdown.cancelled() => {}
            }
            if entry.cancellation.is_cancelled() || inner.shutdown.is_cancelled() {
                Self::finish_job(&inner, &entry, JobStatus::Cancelled, None, None);
                return;
            }
            let seq = inner.submit_seq.fetch_add(1, Ordering::Relaxed);
            inner
                .queue
                .push(QueuedJob {
                    priority: entry.priority,
                    seq,
                    id: entry.id,
                })
                .await;
        });
    }

    /// Applies a terminal transition. Terminal states are sticky: later
    /// calls for an already-finished job are no-ops.
    fn finish_job(
        inner: &Arc<SchedulerInner>,
        entry: &Arc<JobEntry>,
        status: JobStatus,
        result: Option<Vec<u8>>,
        error: Option<String>,
    ) {
        {
            let mut state = entry.lock_state();
            if state.terminal {
                return;
            }
            state.terminal = true;
            state.result = result;
            // A success clears any error left over from earlier retries.
            let last_error = state.error.take();
            state.error = match status {
                JobStatus::Completed => None,
                _ => error.or(last_error),
            };
            // Release this job's slot in its batch window.
            state.batch_permit = None;
            entry.status_tx.send_replace(status);
        }

        match status {
            JobStatus::Completed => inner.metrics.job_completed(),
            JobStatus::Failed => inner.metrics.job_failed(),
            JobStatus::Cancelled => inner.metrics.job_cancelled(),
            _ => {}
        }

        if let Some((id, finished)) = inner.jobs.remove(&entry.id) {
            inner.completed.insert(id, finished);
        }
        debug!(job = %entry.id, status = %status, "Job finished");
    }

    fn outcome_of(entry: &JobEntry) -> JobOutcome {
        let state = entry.lock_state();
        let status = entry.status();
        let attempts = if state.started_at.is_some() {
            entry.retry_count.load(Ordering::Relaxed) + 1
        } else {
            0
        };
        JobOutcome {
            job_id: entry.id,
            status,
            result: state.result.clone(),
            error: state.error.clone(),
            attempts,
            processing_time: (state.processing_time > Duration::ZERO)
                .then_some(state.processing_time),
        }
    }
}
