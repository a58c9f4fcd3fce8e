//! Prelude module for convenient imports.
//!
//! ```ignore
//! use trellis_core::prelude::*;
//! ```

pub use crate::{
    ConfigSet, EffectiveConfig, Error, Method, NodeId, Payload, Progress, Request, RequestBuilder,
    ResourceTree, ResponseEnvelope, Result, Transport, TransportCall, TransportEvents,
    TransportOutcome, from_json, to_json,
};
