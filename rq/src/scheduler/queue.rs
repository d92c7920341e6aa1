//! Queue types for the scheduler

use std::any::Any;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::domain::Priority;

use super::config::QueueOptions;
use super::error::TaskError;

/// Reports a finished task to the actor exactly once, including on panic or abort
pub(crate) struct SlotGuard {
    seq: u64,
    done_tx: mpsc::UnboundedSender<u64>,
}

impl SlotGuard {
    pub(crate) fn new(seq: u64, done_tx: mpsc::UnboundedSender<u64>) -> Self {
        Self { seq, done_tx }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.done_tx.send(self.seq);
    }
}

/// A type-erased unit of work owned by the scheduler
pub(crate) trait Job: Send {
    /// The caller dropped the handle, so nobody is waiting for the output
    fn is_abandoned(&self) -> bool;

    /// Turn the job into the future that runs the operation, releases `slot`,
    /// then settles the handle
    fn run(self: Box<Self>, slot: SlotGuard) -> BoxFuture<'static, ()>;

    /// Settle the handle without running the operation
    fn discard(self: Box<Self>, reason: TaskError);
}

/// An operation waiting to run, paired with the sender half of its handle
pub(crate) struct Deferred<F, T> {
    op: F,
    reply: oneshot::Sender<Result<T, TaskError>>,
}

impl<F, T> Deferred<F, T> {
    pub(crate) fn new(op: F, reply: oneshot::Sender<Result<T, TaskError>>) -> Self {
        Self { op, reply }
    }
}

impl<F, Fut, T> Job for Deferred<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    fn run(self: Box<Self>, slot: SlotGuard) -> BoxFuture<'static, ()> {
        let Deferred { op, reply } = *self;
        async move {
            let outcome = AssertUnwindSafe(async move { op().await }).catch_unwind().await;
            let result = outcome.map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));
            // Release first so the actor sees the completion before the caller sees the output
            drop(slot);
            // The caller may have stopped waiting; the output is dropped then
            let _ = reply.send(result);
        }
        .boxed()
    }

    fn discard(self: Box<Self>, reason: TaskError) {
        let _ = self.reply.send(Err(reason));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A task waiting for admission
pub(crate) struct PendingTask {
    pub seq: u64,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub job: Box<dyn Job>,
}

impl Eq for PendingTask {}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then lower sequence number
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending tasks ordered by priority, then by enqueue sequence
#[derive(Default)]
pub(crate) struct PendingQueue {
    heap: BinaryHeap<PendingTask>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job and return its sequence number
    pub fn push(&mut self, priority: Priority, job: Box<dyn Job>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(PendingTask {
            seq,
            priority,
            enqueued_at: Instant::now(),
            job,
        });
        seq
    }

    pub fn pop(&mut self) -> Option<PendingTask> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every pending task, in no particular order
    pub fn drain(&mut self) -> impl Iterator<Item = PendingTask> + '_ {
        self.heap.drain()
    }
}

/// Lifetime counters for a scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_enqueued: u64,
    pub total_started: u64,
    pub total_completed: u64,
    pub total_cleared: u64,
    /// Pending tasks dropped because their handle was dropped first
    pub total_discarded: u64,
    /// Sum of time spent pending, across started tasks
    pub total_wait_time_ms: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

/// Point-in-time view of a scheduler
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub paused: bool,
    /// Tasks waiting to start
    pub queued: usize,
    /// Tasks currently running
    pub running: usize,
    /// Starts counted against the current rate limit window
    pub window_count: usize,
    /// True while the current window has no admissions left
    pub rate_limited: bool,
    /// A rate limit window is armed
    pub window_active: bool,
    pub options: QueueOptions,
    pub stats: SchedulerStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Noop;

    impl Job for Noop {
        fn is_abandoned(&self) -> bool {
            false
        }

        fn run(self: Box<Self>, _slot: SlotGuard) -> BoxFuture<'static, ()> {
            async {}.boxed()
        }

        fn discard(self: Box<Self>, _reason: TaskError) {}
    }

    fn pop_order(queue: &mut PendingQueue) -> Vec<(Priority, u64)> {
        std::iter::from_fn(|| queue.pop().map(|t| (t.priority, t.seq))).collect()
    }

    #[test]
    fn test_same_priority_is_fifo() {
        let mut queue = PendingQueue::new();
        for _ in 0..5 {
            queue.push(Priority::Normal, Box::new(Noop));
        }

        let seqs: Vec<_> = pop_order(&mut queue).into_iter().map(|(_, seq)| seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = PendingQueue::new();
        queue.push(Priority::Low, Box::new(Noop));
        queue.push(Priority::Normal, Box::new(Noop));
        queue.push(Priority::Critical, Box::new(Noop));
        queue.push(Priority::Normal, Box::new(Noop));

        assert_eq!(
            pop_order(&mut queue),
            vec![
                (Priority::Critical, 2),
                (Priority::Normal, 1),
                (Priority::Normal, 3),
                (Priority::Low, 0),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sequence_keeps_growing_after_drain() {
        let mut queue = PendingQueue::new();
        queue.push(Priority::Normal, Box::new(Noop));
        queue.push(Priority::Normal, Box::new(Noop));
        assert_eq!(queue.drain().count(), 2);
        assert_eq!(queue.len(), 0);

        assert_eq!(queue.push(Priority::Normal, Box::new(Noop)), 2);
    }

    #[tokio::test]
    async fn test_deferred_settles_handle_with_output() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel();
        let job: Box<dyn Job> = Box::new(Deferred::new(|| async { 7 }, tx));
        assert!(!job.is_abandoned());

        job.run(SlotGuard::new(3, done_tx)).await;
        assert_eq!(done_rx.try_recv().unwrap(), 3);
        assert_eq!(rx.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn test_deferred_reports_panic_and_releases_slot() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel::<Result<(), TaskError>>();
        let job: Box<dyn Job> = Box::new(Deferred::new(|| async { panic!("kaboom") }, tx));

        job.run(SlotGuard::new(0, done_tx)).await;
        assert_eq!(done_rx.try_recv().unwrap(), 0);
        assert!(done_rx.try_recv().is_err());
        assert_eq!(rx.await.unwrap(), Err(TaskError::Panicked("kaboom".to_string())));
    }

    #[test]
    fn test_deferred_abandoned_when_receiver_dropped() {
        let (tx, rx) = oneshot::channel::<Result<(), TaskError>>();
        let job = Deferred::new(|| async {}, tx);
        drop(rx);
        assert!(job.is_abandoned());
    }

    #[test]
    fn test_discard_settles_with_reason() {
        let (tx, mut rx) = oneshot::channel::<Result<(), TaskError>>();
        let job: Box<dyn Job> = Box::new(Deferred::new(|| async {}, tx));
        job.discard(TaskError::Cleared);
        assert_eq!(rx.try_recv().unwrap(), Err(TaskError::Cleared));
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop::sample::select(Priority::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_pop_order_is_priority_then_sequence(priorities in prop::collection::vec(priority_strategy(), 0..64)) {
            let mut queue = PendingQueue::new();
            for priority in &priorities {
                queue.push(*priority, Box::new(Noop));
            }

            let order = pop_order(&mut queue);
            prop_assert_eq!(order.len(), priorities.len());
            for pair in order.windows(2) {
                let (p0, s0) = pair[0];
                let (p1, s1) = pair[1];
                prop_assert!(p0 > p1 || (p0 == p1 && s0 < s1));
            }
        }
    }
}
