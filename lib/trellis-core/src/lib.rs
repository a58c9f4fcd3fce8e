//! Core types and contracts for the trellis resource-tree REST client.
//!
//! This crate provides the foundational types used by trellis:
//! - [`ResourceTree`] and [`NodeId`] - the resource tree with inheritable
//!   configuration
//! - [`ConfigSet`] and [`EffectiveConfig`] - sparse per-node settings and
//!   their resolved merge
//! - [`Method`] - HTTP method enum
//! - [`Request`] and [`RequestBuilder`] - immutable request snapshots
//! - [`ResponseEnvelope`] - the single observable outcome of a request
//! - [`Payload`] - opaque bodies and results
//! - [`hooks`] - the four lifecycle hook types
//! - [`Transport`] - the wire-level collaborator contract
//! - [`Error`] and [`Result`] - error handling
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)

mod body;
mod config;
mod envelope;
mod error;
pub mod hooks;
mod method;
pub mod prelude;
mod request;
mod transport;
mod tree;

pub use body::{Payload, from_json, to_json};
pub use config::{ConfigSet, DEFAULT_TIMEOUT, EffectiveConfig};
pub use envelope::ResponseEnvelope;
pub use error::{Error, Result};
pub use hooks::{
    CompletionHook, HookSet, PostProcessError, PostProcessHook, PreflightHook, Progress,
    ProgressHook,
};
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use transport::{
    CompleteFn, ProgressFn, Transport, TransportCall, TransportEvents, TransportHandle,
    TransportOutcome, UncancellableHandle,
};
pub use tree::{NodeId, ResourceTree};

// Re-export http crate types for status codes
pub use http::StatusCode;
