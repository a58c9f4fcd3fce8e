//! Response envelopes.
//!
//! The single observable outcome of a dispatched request. Immutable once
//! constructed; `result` reflects the post-processing hook's output when
//! one ran, never the pre-transform raw body.

use crate::{Error, Payload, Request, Result};

/// Immutable result of one request.
#[derive(Debug)]
pub struct ResponseEnvelope {
    status: Option<u16>,
    result: Payload,
    error: Option<Error>,
    request: Request,
}

impl ResponseEnvelope {
    /// Creates an envelope. Success is derived, not stored: status in the
    /// 2xx range and no error.
    #[must_use]
    pub fn new(request: Request, status: Option<u16>, result: Payload, error: Option<Error>) -> Self {
        Self {
            status,
            result,
            error,
            request,
        }
    }

    /// Creates a failure envelope with no network attempt recorded.
    #[must_use]
    pub fn failed(request: Request, error: Error) -> Self {
        Self::new(request, None, Payload::Empty, Some(error))
    }

    /// HTTP status code, when a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// `true` iff the status is 2xx, no transport-level error occurred,
    /// and preflight did not reject the request.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|s| (200..300).contains(&s))
    }

    /// The result: raw bytes, the completed download destination, or the
    /// post-processing hook's output if one ran.
    #[must_use]
    pub const fn result(&self) -> &Payload {
        &self.result
    }

    /// The error, present iff the request did not succeed.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The originating request, for diagnostics.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Deserialize an in-memory result as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not an in-memory payload or if
    /// deserialization fails.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let bytes = self
            .result
            .as_bytes()
            .ok_or_else(|| Error::JsonDeserialization("result is not an in-memory payload".to_string()))?;
        crate::from_json(bytes)
    }

    /// Consume into `(status, result, error)`.
    #[must_use]
    pub fn into_parts(self) -> (Option<u16>, Payload, Option<Error>) {
        (self.status, self.result, self.error)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use url::Url;

    use super::*;
    use crate::config::EffectiveConfig;
    use crate::{Method, Request};

    fn request() -> Request {
        let url = Url::parse("http://example.com/users").expect("valid URL");
        Request::builder(Method::Get, url, EffectiveConfig::default())
            .build()
            .expect("build")
    }

    #[test]
    fn success_requires_2xx_and_no_error() {
        let envelope = ResponseEnvelope::new(
            request(),
            Some(201),
            Payload::Bytes(Bytes::from_static(b"{}")),
            None,
        );
        assert!(envelope.is_success());
        assert_eq!(envelope.status(), Some(201));
        assert!(envelope.error().is_none());
    }

    #[test]
    fn non_2xx_is_not_success() {
        let envelope = ResponseEnvelope::new(
            request(),
            Some(404),
            Payload::Empty,
            Some(Error::http(404)),
        );
        assert!(!envelope.is_success());
        assert_eq!(envelope.error().and_then(Error::status), Some(404));
    }

    #[test]
    fn error_with_2xx_is_not_success() {
        // post-processing failure after a 200
        let envelope = ResponseEnvelope::new(
            request(),
            Some(200),
            Payload::Empty,
            Some(Error::post_processing("boom")),
        );
        assert!(!envelope.is_success());
    }

    #[test]
    fn failed_records_no_status() {
        let envelope = ResponseEnvelope::failed(request(), Error::RejectedByPreflight);
        assert!(!envelope.is_success());
        assert_eq!(envelope.status(), None);
        assert!(matches!(envelope.error(), Some(Error::RejectedByPreflight)));
    }

    #[test]
    fn json_decodes_bytes_result() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct User {
            id: u64,
        }

        let envelope = ResponseEnvelope::new(
            request(),
            Some(200),
            Payload::Bytes(Bytes::from_static(br#"{"id":7}"#)),
            None,
        );
        let user: User = envelope.json().expect("json");
        assert_eq!(user, User { id: 7 });
    }

    #[test]
    fn json_rejects_file_result() {
        let envelope = ResponseEnvelope::new(
            request(),
            Some(200),
            Payload::File("/tmp/result.bin".into()),
            None,
        );
        assert!(envelope.json::<u64>().is_err());
    }
}
