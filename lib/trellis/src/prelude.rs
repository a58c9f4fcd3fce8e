//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types for easy glob
//! importing:
//!
//! ```ignore
//! use trellis::prelude::*;
//! ```

pub use crate::{
    Error, Method, Payload, Progress, Request, RequestHandle, Resource, ResourceRequest,
    ResponseEnvelope, RestClient, Result, StatusCode, from_json, to_json,
};
pub use serde::{Deserialize, Serialize};
