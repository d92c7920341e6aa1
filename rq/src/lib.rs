//! rpcqueue - bounded, rate-limited scheduling for RPC calls
//!
//! A [`Scheduler`] runs submitted async operations under a concurrency limit
//! and an optional fixed-window rate limit, highest priority first and FIFO
//! within a priority. [`QueuedTransport`] wraps any [`Transport`] so that calls
//! accepted by its dispatch filter (JSON-RPC 2.0 requests by default) go
//! through a scheduler, while everything else is forwarded untouched.
//!
//! # Modules
//!
//! - [`scheduler`] - Queue, admission control and task handles
//! - [`transport`] - Transport seam, dispatch filter and queued wrapper
//! - [`domain`] - Task priorities
//! - [`config`] - Configuration types and loading
//! - [`simulate`] - Synthetic workloads for the CLI
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod scheduler;
pub mod simulate;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use domain::Priority;
pub use scheduler::{
    MAX_INTERVAL_MS, QueueOptions, QueueState, Scheduler, SchedulerError, SchedulerStats, TaskError, TaskHandle,
};
pub use transport::{
    CallFilter, DispatchError, JSON_RPC_VERSION, QueuedTransport, RpcCall, Transport, TransportFn,
    is_json_rpc_payload, transport_fn,
};
