//! Scheduler for queued remote calls
//!
//! Runs submitted operations with a concurrency bound, optional fixed-window
//! rate limiting, and priority/FIFO ordering in a single component.

mod config;
mod core;
mod error;
mod handle;
mod queue;

pub use config::{MAX_INTERVAL_MS, QueueOptions};
pub use self::core::Scheduler;
pub use error::{SchedulerError, TaskError};
pub use handle::TaskHandle;
pub use queue::{QueueState, SchedulerStats};
