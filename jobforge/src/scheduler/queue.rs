//! Bounded priority queue feeding the worker pool.
//!
//! Ordering is priority-first with FIFO within the same priority tier,
//! implemented as a max-heap keyed on (priority, submission sequence).
//! Pushing into a full queue waits for space (backpressure); popping from
//! an empty queue waits for work.

use std::collections::BinaryHeap;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::job::JobId;
use crate::priority::PriorityLevel;

/// One queued dispatch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueuedJob {
    pub priority: PriorityLevel,
    /// Submission sequence; lower dispatches first within a tier.
    pub seq: u64,
    pub id: JobId,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then lower sequence (earlier
        // submission) first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded, priority-ordered job queue.
pub(crate) struct JobQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    capacity: usize,
    /// Signalled when an item is pushed.
    items: Notify,
    /// Signalled when space frees up.
    space: Notify,
}

impl JobQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity: capacity.max(1),
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Pushes a job, waiting for space when the queue is full.
    pub(crate) async fn push(&self, job: QueuedJob) {
        loop {
            let space = self.space.notified();
            {
                let mut heap = self.lock();
                if heap.len() < self.capacity {
                    heap.push(job);
                    drop(heap);
                    self.items.notify_one();
                    return;
                }
            }
            space.await;
        }
    }

    /// Pops the highest-priority job, waiting until one is available.
    pub(crate) async fn pop(&self) -> QueuedJob {
        loop {
            let items = self.items.notified();
            {
                let mut heap = self.lock();
                if let Some(job) = heap.pop() {
                    drop(heap);
                    self.space.notify_one();
                    // Wake the next waiter in case multiple pushes landed
                    // under a single notification.
                    if !self.is_empty() {
                        self.items.notify_one();
                    }
                    return job;
                }
            }
            items.await;
        }
    }

    /// Current queue depth.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no jobs are queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BinaryHeap<QueuedJob>> {
        self.heap.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(priority: PriorityLevel, seq: u64) -> QueuedJob {
        QueuedJob {
            priority,
            seq,
            id: JobId::new(),
        }
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let queue = JobQueue::new(16);
        queue.push(queued(PriorityLevel::Low, 0)).await;
        queue.push(queued(PriorityLevel::Critical, 1)).await;
        queue.push(queued(PriorityLevel::Normal, 2)).await;

        assert_eq!(queue.pop().await.priority, PriorityLevel::Critical);
        assert_eq!(queue.pop().await.priority, PriorityLevel::Normal);
        assert_eq!(queue.pop().await.priority, PriorityLevel::Low);
    }

    #[tokio::test]
    async fn test_fifo_within_tier() {
        let queue = JobQueue::new(16);
        let first = queued(PriorityLevel::Normal, 10);
        let second = queued(PriorityLevel::Normal, 11);
        queue.push(second).await;
        queue.push(first).await;

        assert_eq!(queue.pop().await.seq, 10);
        assert_eq!(queue.pop().await.seq, 11);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = std::sync::Arc::new(JobQueue::new(4));
        let popper = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.push(queued(PriorityLevel::Normal, 1)).await;

        let job = tokio::time::timeout(std::time::Duration::from_secs(1), popper)
            .await
            .expect("pop should wake")
            .expect("pop task should not panic");
        assert_eq!(job.seq, 1);
    }

    #[tokio::test]
    async fn test_push_backpressure() {
        let queue = std::sync::Arc::new(JobQueue::new(1));
        queue.push(queued(PriorityLevel::Normal, 1)).await;

        let pusher = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move {
                queue.push(queued(PriorityLevel::Normal, 2)).await;
            })
        };

        // The second push must block until we pop.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pusher.is_finished());

        assert_eq!(queue.pop().await.seq, 1);
        tokio::time::timeout(std::time::Duration::from_secs(1), pusher)
            .await
            .expect("push should unblock")
            .expect("push task should not panic");
        assert_eq!(queue.len(), 1);
    }
}
