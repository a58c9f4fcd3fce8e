//! Hierarchical REST resource client.
//!
//! Model an API as a tree of resources with inherited configuration, then
//! execute requests through a hook-driven dispatch pipeline.
//!
//! # Example
//!
//! ```no_run
//! use trellis::prelude::*;
//!
//! # fn main() -> trellis::Result<()> {
//! let client = RestClient::new("https://api.example.com")?;
//!
//! let users = client.root().child("users")?;
//! users.set_header("authorization", "Bearer t0k3n")?;
//! users.set_timeout(std::time::Duration::from_secs(5))?;
//!
//! // inherits the header and timeout from `users`
//! let response = users.child(42)?.get()?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! Every request is an immutable snapshot taken at build time; hooks run on
//! a serialized affinity context (post-processing excepted, which runs on a
//! worker pool), and each request settles with exactly one
//! [`ResponseEnvelope`].

mod client;
mod context;
mod dispatcher;
pub mod prelude;
mod transport;

pub use client::{Resource, ResourceRequest, RestClient};
pub use context::{SerialContext, WorkerPool};
pub use dispatcher::{Dispatcher, RequestHandle};
pub use transport::HyperTransport;

// Re-export core types
pub use trellis_core::{
    CompleteFn, CompletionHook, ConfigSet, DEFAULT_TIMEOUT, EffectiveConfig, Error, HookSet,
    Method, NodeId,
    Payload, PostProcessError, PostProcessHook, PreflightHook, Progress, ProgressFn, ProgressHook,
    Request, RequestBuilder, ResourceTree, ResponseEnvelope, Result, Transport, TransportCall,
    TransportEvents, TransportHandle, TransportOutcome, UncancellableHandle, from_json, to_json,
};

// Re-export http types for status codes
pub use trellis_core::StatusCode;
