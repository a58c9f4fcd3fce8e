//! Opaque payloads and JSON convenience helpers.
//!
//! The dispatch pipeline treats bodies and results as opaque: either raw
//! bytes or a file handle that the transport streams through. [`to_json`]
//! and [`from_json`] exist purely as caller conveniences for structured
//! payloads.

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::Result;

/// An opaque body or result: nothing, raw bytes, or a file on disk.
///
/// `File` doubles as an upload source (request side) and as the completed
/// download destination (response side).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// An in-memory byte payload.
    Bytes(Bytes),
    /// A file handle, streamed by the transport.
    File(PathBuf),
}

impl Payload {
    /// Returns `true` if there is no body.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Raw bytes, if this payload is in-memory.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// File path, if this payload is a file handle.
    #[must_use]
    pub fn as_file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for Payload {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use trellis_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { name: String }
///
/// let user = User { name: "Alice".to_string() };
/// let bytes = to_json(&user).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"Alice"}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Deserialize a value from JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| crate::Error::JsonDeserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accessors() {
        assert!(Payload::Empty.is_empty());

        let payload = Payload::from(Bytes::from_static(b"abc"));
        assert!(!payload.is_empty());
        assert_eq!(payload.as_bytes().map(Bytes::as_ref), Some(&b"abc"[..]));
        assert!(payload.as_file().is_none());

        let payload = Payload::from(PathBuf::from("/tmp/upload.bin"));
        assert_eq!(payload.as_file(), Some(Path::new("/tmp/upload.bin")));
        assert!(payload.as_bytes().is_none());
    }

    #[test]
    fn json_round_trip() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct User {
            id: u64,
            name: String,
        }

        let user = User {
            id: 7,
            name: "test".to_string(),
        };
        let bytes = to_json(&user).expect("serialize");
        let back: User = from_json(&bytes).expect("deserialize");
        assert_eq!(back, user);
    }

    #[test]
    fn from_json_invalid() {
        let bytes = Bytes::from_static(b"not json");
        let result: Result<u64> = from_json(&bytes);
        assert!(result.is_err());
    }
}
