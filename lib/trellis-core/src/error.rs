//! Error types for trellis.

use derive_more::{Display, Error, From};

use crate::Method;

/// Main error type for trellis operations.
///
/// Construction-time errors ([`Error::InvalidMethodBody`],
/// [`Error::ConflictingBodySource`]) surface synchronously from the request
/// builder and never reach a completion hook. Every other kind is delivered
/// through the completion path inside a non-success
/// [`ResponseEnvelope`](crate::ResponseEnvelope).
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// HTTP-level errors (non-2xx status codes).
    #[display("HTTP error {status}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The HTTP method does not admit a structured payload.
    #[display("{method} requests must not carry a structured payload")]
    #[from(skip)]
    InvalidMethodBody {
        /// The offending method.
        method: Method,
    },

    /// Both a structured payload and an upload source were supplied.
    #[display("structured payload and upload source are mutually exclusive")]
    #[from(skip)]
    ConflictingBodySource,

    /// The preflight hook vetoed the request before any network activity.
    #[display("request rejected by preflight hook")]
    #[from(skip)]
    RejectedByPreflight,

    /// Any failure reported by the transport collaborator, including
    /// connectivity, TLS, timeouts, and malformed responses.
    #[display("transport error: {_0}")]
    #[from(skip)]
    Transport(#[error(not(source))] String),

    /// A post-processing hook returned an error instead of a value.
    #[display("post-processing failed: {_0}")]
    #[from(skip)]
    PostProcessingFailed(#[error(not(source))] String),

    /// The request was cancelled before its completion fired.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// An ancestor node was released while descendants still resolve
    /// against it. Unreachable when the tree is used per its ownership
    /// contract; reachable through [`ResourceTree::release`](crate::ResourceTree::release).
    #[display("ancestor resource no longer exists")]
    #[from(skip)]
    DanglingAncestor,

    /// A blocking dispatch was attempted from the affinity context itself.
    #[display("blocking dispatch would deadlock the affinity context")]
    #[from(skip)]
    WouldDeadlock,

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error.
    #[display("JSON deserialization error: {_0}")]
    #[from(skip)]
    JsonDeserialization(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an HTTP error from a status code.
    #[must_use]
    pub const fn http(status: u16) -> Self {
        Self::Http { status }
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a post-processing error.
    #[must_use]
    pub fn post_processing(message: impl Into<String>) -> Self {
        Self::PostProcessingFailed(message.into())
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a transport-level error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the request was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the preflight hook vetoed the request.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::RejectedByPreflight)
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::http(404);
        assert_eq!(err.to_string(), "HTTP error 404");

        let err = Error::InvalidMethodBody {
            method: Method::Get,
        };
        assert_eq!(
            err.to_string(),
            "GET requests must not carry a structured payload"
        );

        let err = Error::transport("connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "request cancelled");
    }

    #[test]
    fn error_status() {
        let err = Error::http(404);
        assert_eq!(err.status(), Some(404));
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = Error::http(503);
        assert!(err.is_server_error());

        assert_eq!(Error::Cancelled.status(), None);
    }

    #[test]
    fn error_predicates() {
        assert!(Error::transport("boom").is_transport());
        assert!(!Error::Cancelled.is_transport());

        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::RejectedByPreflight.is_rejected());
        assert!(!Error::RejectedByPreflight.is_cancelled());
    }
}
