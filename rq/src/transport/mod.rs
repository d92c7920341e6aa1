//! Transport seam and the queued transport wrapper
//!
//! A [`Transport`] sends one [`RpcCall`] and returns the response value.
//! [`QueuedTransport`] wraps any transport so that calls accepted by a
//! dispatch filter go through a [`Scheduler`](crate::scheduler::Scheduler)
//! while everything else is sent straight away.

mod filter;
mod queued;

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

pub use filter::{JSON_RPC_VERSION, RpcCall, is_json_rpc_payload};
pub use queued::{CallFilter, DispatchError, QueuedTransport};

/// Sends calls to a remote endpoint
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send(&self, call: RpcCall) -> Result<Value, Self::Error>;
}

/// A [`Transport`] backed by an async function, see [`transport_fn`]
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Use an async function as a [`Transport`]
pub fn transport_fn<F, Fut, E>(f: F) -> TransportFn<F>
where
    F: Fn(RpcCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    TransportFn { f }
}

#[async_trait]
impl<F, Fut, E> Transport for TransportFn<F>
where
    F: Fn(RpcCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    async fn send(&self, call: RpcCall) -> Result<Value, E> {
        (self.f)(call).await
    }
}
