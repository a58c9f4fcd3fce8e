//! Transport collaborator contract.
//!
//! The core performs no network I/O itself. The dispatcher hands a
//! [`TransportCall`] plus a pair of callbacks to whatever implements
//! [`Transport`], which must execute asynchronously (the caller is never
//! blocked), report data events through `on_progress`, and report the
//! terminal outcome through `on_complete` exactly once. Timeouts are the
//! transport's responsibility, surfaced as a transport-level error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::{Error, Method, Payload, Request};

/// Wire-level parameters of one call, detached from the request snapshot.
#[derive(Debug, Clone)]
pub struct TransportCall {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Merged headers (lowercase keys).
    pub headers: HashMap<String, String>,
    /// Timeout the transport must enforce.
    pub timeout: Duration,
    /// Body source; `Payload::File` is streamed without full buffering.
    pub body: Payload,
    /// Download destination; when set, the response body is streamed there
    /// and the outcome carries the destination instead of bytes.
    pub destination: Option<PathBuf>,
}

impl TransportCall {
    /// Extract the wire-level parameters from a request snapshot.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            timeout: request.timeout(),
            body: request.body().clone(),
            destination: request.destination().map(Path::to_path_buf),
        }
    }
}

/// Terminal result reported by the transport.
#[derive(Debug)]
pub struct TransportOutcome {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Raw body bytes, or the completed download destination.
    pub payload: Payload,
    /// Transport-level failure, if any.
    pub error: Option<Error>,
}

impl TransportOutcome {
    /// A received response (any status).
    #[must_use]
    pub const fn response(status: u16, payload: Payload) -> Self {
        Self {
            status: Some(status),
            payload,
            error: None,
        }
    }

    /// A transport-level failure with no usable response.
    #[must_use]
    pub const fn failure(error: Error) -> Self {
        Self {
            status: None,
            payload: Payload::Empty,
            error: Some(error),
        }
    }
}

/// Progress callback: completion fraction plus, for downloads, the
/// temporary destination once fully written.
pub type ProgressFn = Box<dyn Fn(f64, Option<&Path>) + Send + Sync>;

/// Completion callback, invoked exactly once per call.
pub type CompleteFn = Box<dyn FnOnce(TransportOutcome) + Send>;

/// Callbacks the transport drives for one call.
pub struct TransportEvents {
    /// Data-event observer (0..N invocations).
    pub on_progress: ProgressFn,
    /// Terminal observer (exactly 1 invocation).
    pub on_complete: CompleteFn,
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents").finish_non_exhaustive()
    }
}

/// Handle to an in-flight transport call.
pub trait TransportHandle: Send + Sync {
    /// Best-effort abort of in-flight I/O. Idempotent; cancelling after
    /// completion is a no-op.
    fn cancel(&self);
}

/// Handle for transports that cannot abort (or already completed).
#[derive(Debug, Clone, Copy, Default)]
pub struct UncancellableHandle;

impl TransportHandle for UncancellableHandle {
    fn cancel(&self) {}
}

/// Abstract "execute an HTTP call" capability consumed by the dispatcher.
pub trait Transport: Send + Sync + 'static {
    /// Start the call. Must not block; events fire from transport-owned
    /// threads or tasks.
    fn execute(&self, call: TransportCall, events: TransportEvents) -> Box<dyn TransportHandle>;
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::config::EffectiveConfig;

    #[test]
    fn call_mirrors_request_snapshot() {
        let url = Url::parse("http://example.com/users").expect("valid URL");
        let request = Request::builder(Method::Post, url.clone(), EffectiveConfig::default())
            .header("x-trace", "1")
            .payload(Bytes::from_static(b"{}"))
            .build()
            .expect("build");

        let call = TransportCall::from_request(&request);
        assert_eq!(call.method, Method::Post);
        assert_eq!(call.url, url);
        assert_eq!(call.headers.get("x-trace").map(String::as_str), Some("1"));
        assert!(call.body.as_bytes().is_some());
        assert!(call.destination.is_none());
    }

    #[test]
    fn outcome_constructors() {
        let outcome = TransportOutcome::response(204, Payload::Empty);
        assert_eq!(outcome.status, Some(204));
        assert!(outcome.error.is_none());

        let outcome = TransportOutcome::failure(Error::transport("refused"));
        assert_eq!(outcome.status, None);
        assert!(outcome.error.is_some());
    }
}
