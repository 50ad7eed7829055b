//! Job model for the scheduler.
//!
//! A job is an opaque, re-runnable unit of work submitted with priority,
//! timeout, and retry metadata. Callers close over their own data; the
//! scheduler never inspects what the work does, only its result. Work
//! produces an optional opaque payload so results can flow back through
//! `await_completion` without the scheduler knowing their shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::priority::PriorityLevel;

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a job.
///
/// IDs are monotonically increasing and unique within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Creates a new unique job ID.
    pub fn new() -> Self {
        Self(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value of this job ID.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Job execution status.
///
/// `Pending → Running → {Completed | Failed | Cancelled}`, with `Failed`
/// attempts looping through `Retrying` back to `Running` while retries
/// remain. Terminal states are sticky: no further transition occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    /// Queued, waiting for a worker.
    #[default]
    Pending,
    /// Currently executing on a worker.
    Running,
    /// Waiting out a retry backoff.
    Retrying,
    /// Finished successfully.
    Completed,
    /// Exhausted its retries without success.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// True for `Completed`, `Failed`, and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// True while the job may still produce a result.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the status name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error produced by a unit of work.
///
/// A plain message wrapper: the scheduler captures whatever the work
/// raised without interpreting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkError(pub String);

impl WorkError {
    /// Creates a work error from any displayable value.
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl std::fmt::Display for WorkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for WorkError {}

impl From<String> for WorkError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for WorkError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Result type produced by a unit of work.
pub type WorkResult = Result<Option<Vec<u8>>, WorkError>;

/// Execution context handed to a unit of work on each attempt.
///
/// Carries the per-job cancellation token: in-flight work must poll
/// [`WorkContext::is_cancelled`] (or await [`WorkContext::cancelled`]) to
/// honor cooperative cancellation; otherwise it runs to completion.
#[derive(Debug, Clone)]
pub struct WorkContext {
    cancellation: CancellationToken,
    attempt: u32,
}

impl WorkContext {
    pub(crate) fn new(cancellation: CancellationToken, attempt: u32) -> Self {
        Self {
            cancellation,
            attempt,
        }
    }

    /// True once the job has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the job is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// 1-based attempt number (1 on the first run, 2 on the first retry).
    #[inline]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// A re-runnable unit of work.
///
/// `execute` is called once per attempt; retried jobs re-execute the same
/// work with a fresh context carrying the new attempt number.
pub trait Work: Send + Sync + 'static {
    /// Runs one attempt of the work.
    fn execute(&self, ctx: WorkContext) -> BoxFuture<'static, WorkResult>;
}

/// Adapts an async closure into a [`Work`] implementation.
///
/// # Example
///
/// ```ignore
/// use jobforge::scheduler::work_fn;
///
/// let work = work_fn(|_ctx| async move { Ok(Some(b"payload".to_vec())) });
/// let id = scheduler.submit(work, Default::default()).await;
/// ```
pub fn work_fn<F, Fut>(f: F) -> Arc<dyn Work>
where
    F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = WorkResult> + Send + 'static,
{
    struct FnWork {
        f: Box<dyn Fn(WorkContext) -> BoxFuture<'static, WorkResult> + Send + Sync>,
    }

    impl Work for FnWork {
        fn execute(&self, ctx: WorkContext) -> BoxFuture<'static, WorkResult> {
            (self.f)(ctx)
        }
    }

    Arc::new(FnWork {
        f: Box::new(move |ctx| Box::pin(f(ctx))),
    })
}

/// Options supplied at submission time.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Short human-readable label for logging.
    pub label: Option<String>,
    /// Queue priority.
    pub priority: PriorityLevel,
    /// Per-attempt timeout; `None` falls back to the scheduler default.
    pub timeout: Option<Duration>,
    /// Maximum retries; `None` falls back to the scheduler default.
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    /// Options with the given priority and everything else defaulted.
    pub fn with_priority(priority: PriorityLevel) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Final (or in-flight, on await timeout) view of one job, as reported by
/// `await_completion`.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// The job this outcome describes.
    pub job_id: JobId,
    /// Status at reporting time. Non-terminal statuses mean the await
    /// deadline elapsed with the job still outstanding.
    pub status: JobStatus,
    /// Payload produced by completed work.
    pub result: Option<Vec<u8>>,
    /// Captured error for failed work.
    pub error: Option<String>,
    /// Attempts made so far (1 + retries).
    pub attempts: u32,
    /// Accumulated execution time across attempts.
    pub processing_time: Option<Duration>,
}

impl JobOutcome {
    /// True when the job finished successfully.
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique_and_monotonic() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_job_id_display() {
        let id = JobId::new();
        assert!(format!("{id}").starts_with("job-"));
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(format!("{}", JobStatus::Retrying), "retrying");
        assert_eq!(format!("{}", JobStatus::Completed), "completed");
    }

    #[test]
    fn test_work_error_from_str() {
        let err: WorkError = "boom".into();
        assert_eq!(format!("{err}"), "boom");
    }

    #[tokio::test]
    async fn test_work_fn_executes() {
        let work = work_fn(|ctx| async move {
            assert_eq!(ctx.attempt(), 1);
            Ok(Some(vec![1, 2, 3]))
        });

        let ctx = WorkContext::new(CancellationToken::new(), 1);
        let result = work.execute(ctx).await;
        assert_eq!(result.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_work_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = WorkContext::new(token.clone(), 1);

        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
    }

    #[test]
    fn test_submit_options_default() {
        let opts = SubmitOptions::default();
        assert_eq!(opts.priority, PriorityLevel::Normal);
        assert!(opts.timeout.is_none());
        assert!(opts.max_retries.is_none());
    }
}
