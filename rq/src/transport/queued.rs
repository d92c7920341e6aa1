//! QueuedTransport - routes filtered calls through a scheduler

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::scheduler::{QueueOptions, Scheduler, SchedulerError, TaskError};

use super::Transport;
use super::filter::RpcCall;

/// Errors from a [`QueuedTransport`]
#[derive(Debug, Error)]
pub enum DispatchError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The wrapped transport failed; the error is passed through unchanged
    #[error(transparent)]
    Transport(E),

    /// The scheduler settled the call without running it to completion
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl<E> DispatchError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The wrapped transport's error, if that is what failed
    pub fn transport_error(&self) -> Option<&E> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Task(_) => None,
        }
    }
}

/// Default dispatch filter type: a plain function pointer
pub type CallFilter = fn(&RpcCall) -> bool;

/// A transport whose filtered calls are queued behind a [`Scheduler`]
///
/// Calls the filter accepts are enqueued and obey the scheduler's limits and
/// pause state. Calls it rejects go straight to the inner transport.
pub struct QueuedTransport<T, P = CallFilter> {
    inner: Arc<T>,
    filter: P,
    scheduler: Scheduler,
}

impl<T: Transport> QueuedTransport<T> {
    /// Queue JSON-RPC calls to `transport` behind a new scheduler
    pub fn new(transport: T, options: QueueOptions) -> Result<Self, SchedulerError> {
        debug!(?options, "QueuedTransport::new: called");
        Ok(Self::from_scheduler(transport, Scheduler::new(options)?))
    }

    /// Queue JSON-RPC calls to `transport` behind an existing scheduler
    pub fn from_scheduler(transport: T, scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(transport),
            filter: RpcCall::is_json_rpc,
            scheduler,
        }
    }
}

impl<T: Transport, P> QueuedTransport<T, P> {
    /// Replace the dispatch filter
    pub fn with_filter<Q>(self, filter: Q) -> QueuedTransport<T, Q>
    where
        Q: Fn(&RpcCall) -> bool + Send + Sync + 'static,
    {
        QueuedTransport {
            inner: self.inner,
            filter,
            scheduler: self.scheduler,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T, P> Transport for QueuedTransport<T, P>
where
    T: Transport,
    P: Fn(&RpcCall) -> bool + Send + Sync + 'static,
{
    type Error = DispatchError<T::Error>;

    async fn send(&self, call: RpcCall) -> Result<Value, Self::Error> {
        if !(self.filter)(&call) {
            debug!("QueuedTransport::send: filter rejected call, bypassing queue");
            return self.inner.send(call).await.map_err(DispatchError::Transport);
        }

        debug!("QueuedTransport::send: queueing call");
        let inner = Arc::clone(&self.inner);
        let outcome = self.scheduler.enqueue(move || async move { inner.send(call).await }).await?;
        outcome.map_err(DispatchError::Transport)
    }
}
