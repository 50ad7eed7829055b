//! Job scheduling and execution.
//!
//! The scheduler accepts opaque units of work with priority, timeout, and
//! retry metadata, runs them on a resizable pool of worker tasks fed by a
//! bounded priority queue, and tracks per-job and aggregate metrics.
//!
//! # Architecture
//!
//! ```text
//! submit / submit_batch
//!        │
//!        ▼
//! ┌──────────────┐     ┌───────────────────────────┐
//! │  JobQueue    │────►│  Worker pool (1..=50)     │
//! │  (priority,  │     │  each worker: pop → run   │
//! │   bounded)   │     │  with timeout → finish or │
//! └──────────────┘     │  schedule retry           │
//!        ▲             └─────────────┬─────────────┘
//!        │  re-enqueue after backoff │ terminal
//! ┌──────┴───────┐          ┌────────▼─────────┐
//! │ Retry timers │          │ Completed jobs + │
//! │ (off-worker) │          │ metrics          │
//! └──────────────┘          └──────────────────┘
//! ```

mod job;
mod metrics;
mod queue;
#[allow(clippy::module_inception)]
mod scheduler;

pub use job::{
    work_fn, JobId, JobOutcome, JobStatus, SubmitOptions, Work, WorkContext, WorkError,
    WorkResult,
};
pub use metrics::{ProcessingMetrics, WorkerMetrics};
pub use scheduler::{
    retry_backoff, JobScheduler, SchedulerConfig, SchedulerError, BATCH_INFLIGHT_MULTIPLIER,
    DEFAULT_MAX_RETRIES, DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY, MAX_POOL_SIZE,
    MAX_RETRY_BACKOFF, MIN_POOL_SIZE,
};
