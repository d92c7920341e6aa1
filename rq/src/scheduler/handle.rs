//! TaskHandle - completion handle returned by `Scheduler::enqueue`

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::error::TaskError;

/// Resolves with the task's output once its operation finishes
///
/// The output is passed through unchanged: a task returning `Result<R, E>`
/// resolves to `Ok(Result<R, E>)`. The outer `Err` only carries reasons the
/// scheduler itself settled the task (see [`TaskError`]).
///
/// Dropping the handle before the task starts discards the task. Once the
/// task is running, dropping the handle does not stop it.
#[must_use = "dropping a TaskHandle discards the task if it has not started"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Closed)))
    }
}
