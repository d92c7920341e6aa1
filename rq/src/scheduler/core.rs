//! Scheduler implementation
//!
//! A [`Scheduler`] is a cheap, cloneable handle. All run state lives in a
//! single actor task that processes one event at a time: commands from
//! handles, completions from running tasks, and window rollovers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::domain::Priority;

use super::config::QueueOptions;
use super::error::{SchedulerError, TaskError};
use super::handle::TaskHandle;
use super::queue::{Deferred, Job, PendingQueue, PendingTask, QueueState, SchedulerStats, SlotGuard};

/// Requests from handles to the scheduler actor
enum Command {
    Enqueue { priority: Priority, job: Box<dyn Job> },
    Pause,
    Resume,
    Clear,
    State { reply_tx: oneshot::Sender<QueueState> },
    WhenEmpty { reply_tx: oneshot::Sender<()> },
    WhenIdle { reply_tx: oneshot::Sender<()> },
    WhenSizeBelow { limit: usize, reply_tx: oneshot::Sender<()> },
}

/// Bounded-concurrency, optionally rate-limited task queue
///
/// Tasks are started highest priority first, in submission order within a
/// priority, while fewer than `concurrency` tasks run and the current rate
/// limit window still has admissions left.
///
/// Rate limiting uses fixed windows of `interval_ms`. A window opens with
/// the first admission while no window is active. At each rollover the
/// window count becomes the number of still-running tasks when
/// `carryover_concurrency_count` is set, and 0 otherwise. Tasks finishing
/// mid-window do not hand their admission back.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Command>,
    options: Arc<QueueOptions>,
}

impl Scheduler {
    /// Create a scheduler and spawn its actor on the current tokio runtime
    pub fn new(options: QueueOptions) -> Result<Self, SchedulerError> {
        debug!(?options, "Scheduler::new: called");
        let options = options.validated()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = SchedulerActor::new(options.clone(), rx);
        runtime.spawn(actor.run());

        Ok(Self {
            tx,
            options: Arc::new(options),
        })
    }

    /// The validated options this scheduler runs with
    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Max tasks running at once
    pub fn concurrency(&self) -> usize {
        self.options.concurrency
    }

    /// Submit an operation at the default priority
    pub fn enqueue<F, Fut, T>(&self, op: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue_with_priority(op, Priority::default())
    }

    /// Submit an operation at the given priority
    ///
    /// Never blocks: the queue is unbounded. The operation runs at most once.
    pub fn enqueue_with_priority<F, Fut, T>(&self, op: F, priority: Priority) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        debug!(%priority, "Scheduler::enqueue_with_priority: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Box::new(Deferred::new(op, reply_tx));

        // On a closed channel the job is dropped with the command and the handle resolves to Closed
        if self.tx.send(Command::Enqueue { priority, job }).is_err() {
            warn!("Scheduler::enqueue_with_priority: actor gone, task dropped");
        }
        TaskHandle::new(reply_rx)
    }

    /// Submit several operations at the default priority, keeping their order
    pub fn enqueue_all<I, F, Fut, T>(&self, ops: I) -> Vec<TaskHandle<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        debug!("Scheduler::enqueue_all: called");
        ops.into_iter().map(|op| self.enqueue(op)).collect()
    }

    /// Stop starting new tasks; running tasks continue
    pub fn pause(&self) {
        debug!("Scheduler::pause: called");
        self.send(Command::Pause);
    }

    /// Start admitting tasks again, immediately filling free capacity
    pub fn resume(&self) {
        debug!("Scheduler::resume: called");
        self.send(Command::Resume);
    }

    /// Discard every pending task; their handles resolve to [`TaskError::Cleared`]
    pub fn clear(&self) {
        debug!("Scheduler::clear: called");
        self.send(Command::Clear);
    }

    /// Snapshot of the scheduler, taken after every earlier command was applied
    pub async fn state(&self) -> Result<QueueState, SchedulerError> {
        debug!("Scheduler::state: called");
        self.request(|reply_tx| Command::State { reply_tx }).await
    }

    /// Whether admissions are currently stopped
    pub async fn is_paused(&self) -> Result<bool, SchedulerError> {
        Ok(self.state().await?.paused)
    }

    /// Number of tasks waiting to start
    pub async fn size(&self) -> Result<usize, SchedulerError> {
        Ok(self.state().await?.queued)
    }

    /// Number of tasks currently running
    pub async fn pending(&self) -> Result<usize, SchedulerError> {
        Ok(self.state().await?.running)
    }

    /// Resolves once no task is waiting to start
    pub async fn on_empty(&self) -> Result<(), SchedulerError> {
        debug!("Scheduler::on_empty: called");
        self.request(|reply_tx| Command::WhenEmpty { reply_tx }).await
    }

    /// Resolves once no task is waiting or running
    pub async fn on_idle(&self) -> Result<(), SchedulerError> {
        debug!("Scheduler::on_idle: called");
        self.request(|reply_tx| Command::WhenIdle { reply_tx }).await
    }

    /// Resolves once fewer than `limit` tasks are waiting to start
    ///
    /// A `limit` of 0 can never be met and is rejected with
    /// [`SchedulerError::InvalidOptions`].
    pub async fn on_size_less_than(&self, limit: usize) -> Result<(), SchedulerError> {
        debug!(limit, "Scheduler::on_size_less_than: called");
        if limit == 0 {
            return Err(SchedulerError::InvalidOptions(
                "on_size_less_than limit must be at least 1".to_string(),
            ));
        }
        self.request(|reply_tx| Command::WhenSizeBelow { limit, reply_tx }).await
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            warn!("Scheduler actor gone, command dropped");
        }
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).map_err(|_| SchedulerError::Stopped)?;
        reply_rx.await.map_err(|_| SchedulerError::Stopped)
    }
}

/// Exclusive owner of the run state
struct SchedulerActor {
    options: QueueOptions,
    interval: Option<Duration>,
    rx: mpsc::UnboundedReceiver<Command>,
    done_tx: mpsc::UnboundedSender<u64>,
    done_rx: mpsc::UnboundedReceiver<u64>,
    queue: PendingQueue,
    paused: bool,
    running: usize,
    window_count: usize,
    window_deadline: Option<Instant>,
    empty_waiters: Vec<oneshot::Sender<()>>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    size_waiters: Vec<(usize, oneshot::Sender<()>)>,
    stats: SchedulerStats,
    /// Every Scheduler handle has been dropped
    closed: bool,
}

impl SchedulerActor {
    fn new(options: QueueOptions, rx: mpsc::UnboundedReceiver<Command>) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            interval: options.interval(),
            paused: !options.auto_start,
            options,
            rx,
            done_tx,
            done_rx,
            queue: PendingQueue::new(),
            running: 0,
            window_count: 0,
            window_deadline: None,
            empty_waiters: Vec::new(),
            idle_waiters: Vec::new(),
            size_waiters: Vec::new(),
            stats: SchedulerStats::default(),
            closed: false,
        }
    }

    async fn run(mut self) {
        info!(
            concurrency = self.options.concurrency,
            interval_ms = self.options.interval_ms,
            interval_cap = self.options.interval_cap,
            paused = self.paused,
            "Scheduler started"
        );

        loop {
            let deadline = self.window_deadline;

            // Completions first: a task's slot is released before its handle settles,
            // so queries sent after awaiting a handle always see the completion
            tokio::select! {
                biased;

                Some(seq) = self.done_rx.recv() => self.handle_completion(seq),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => self.roll_window(),
                cmd = self.rx.recv(), if !self.closed => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("SchedulerActor::run: all handles dropped");
                        self.closed = true;
                    }
                },
            }

            self.admit();
            self.notify_waiters();

            if self.closed && self.running == 0 && (self.paused || self.queue.is_empty()) {
                break;
            }
        }

        let leftover = self.queue.len();
        for task in self.queue.drain() {
            task.job.discard(TaskError::Closed);
        }
        info!(leftover, "Scheduler stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue { priority, job } => {
                let seq = self.queue.push(priority, job);
                self.stats.total_enqueued += 1;
                self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.queue.len());
                debug!(seq, %priority, queued = self.queue.len(), "Enqueued");
            }
            Command::Pause => {
                debug!("SchedulerActor::handle_command: pause");
                self.paused = true;
            }
            Command::Resume => {
                debug!("SchedulerActor::handle_command: resume");
                self.paused = false;
                // A window closed while paused may still hold carried-over starts
                if let (Some(interval), None) = (self.interval, self.window_deadline) {
                    if self.window_count > 0 {
                        self.window_deadline = Some(Instant::now() + interval);
                    }
                }
            }
            Command::Clear => {
                let mut cleared = 0;
                for task in self.queue.drain() {
                    task.job.discard(TaskError::Cleared);
                    cleared += 1;
                }
                self.stats.total_cleared += cleared;
                debug!(cleared, "Cleared pending tasks");
            }
            Command::State { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }
            Command::WhenEmpty { reply_tx } => self.empty_waiters.push(reply_tx),
            Command::WhenIdle { reply_tx } => self.idle_waiters.push(reply_tx),
            Command::WhenSizeBelow { limit, reply_tx } => self.size_waiters.push((limit, reply_tx)),
        }
    }

    fn handle_completion(&mut self, seq: u64) {
        debug_assert!(self.running > 0, "completion without a running task");
        self.running = self.running.saturating_sub(1);
        self.stats.total_completed += 1;
        debug!(seq, running = self.running, "Completed");
    }

    fn roll_window(&mut self) {
        let (Some(interval), Some(deadline)) = (self.interval, self.window_deadline) else {
            return;
        };

        self.window_count = if self.options.carryover_concurrency_count {
            self.running
        } else {
            0
        };

        if self.paused || (self.window_count == 0 && self.queue.is_empty()) {
            debug!(paused = self.paused, "SchedulerActor::roll_window: closing window");
            self.window_deadline = None;
            return;
        }

        let now = Instant::now();
        let next = deadline + interval;
        self.window_deadline = Some(if next > now { next } else { now + interval });
        debug!(window_count = self.window_count, "Window rolled over");
    }

    fn window_has_capacity(&self) -> bool {
        self.interval.is_none() || self.window_count < self.options.interval_cap
    }

    fn can_start(&self) -> bool {
        !self.paused && self.running < self.options.concurrency && self.window_has_capacity()
    }

    fn admit(&mut self) {
        while self.can_start() {
            let Some(task) = self.queue.pop() else {
                break;
            };

            if task.job.is_abandoned() {
                debug!(seq = task.seq, "Handle dropped before start, discarding");
                self.stats.total_discarded += 1;
                continue;
            }

            self.start(task);
        }
    }

    fn start(&mut self, task: PendingTask) {
        let PendingTask {
            seq,
            priority,
            enqueued_at,
            job,
        } = task;
        let now = Instant::now();

        self.running += 1;
        debug_assert!(self.running <= self.options.concurrency);

        if let Some(interval) = self.interval {
            self.window_count += 1;
            if self.window_deadline.is_none() {
                self.window_deadline = Some(now + interval);
            }
        }

        self.stats.total_started += 1;
        self.stats.total_wait_time_ms += now.duration_since(enqueued_at).as_millis() as u64;
        self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.running);
        debug!(seq, %priority, running = self.running, window_count = self.window_count, "Starting task");

        tokio::spawn(job.run(SlotGuard::new(seq, self.done_tx.clone())));
    }

    fn notify_waiters(&mut self) {
        if self.queue.is_empty() {
            for tx in self.empty_waiters.drain(..) {
                let _ = tx.send(());
            }
            if self.running == 0 {
                for tx in self.idle_waiters.drain(..) {
                    let _ = tx.send(());
                }
            }
        }

        let queued = self.queue.len();
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.size_waiters)
            .into_iter()
            .partition(|(limit, _)| queued < *limit);
        self.size_waiters = waiting;
        for (_, tx) in ready {
            let _ = tx.send(());
        }
    }

    fn snapshot(&self) -> QueueState {
        QueueState {
            paused: self.paused,
            queued: self.queue.len(),
            running: self.running,
            window_count: self.window_count,
            rate_limited: !self.window_has_capacity(),
            window_active: self.window_deadline.is_some(),
            options: self.options.clone(),
            stats: self.stats.clone(),
        }
    }
}
