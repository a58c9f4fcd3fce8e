//! Request snapshots.
//!
//! A [`Request`] is the immutable, fully resolved picture of one call:
//! URL, merged headers, timeout, body source, and hook references, all
//! snapshotted at build time. Mutating any ancestor's configuration after
//! `build()` has no effect on a request already built.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::config::EffectiveConfig;
use crate::hooks::{CompletionHook, HookSet, ProgressHook};
use crate::{Error, Method, Payload, Result};

/// An immutable request snapshot, consumed by the dispatcher.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HashMap<String, String>,
    timeout: Duration,
    body: Payload,
    destination: Option<PathBuf>,
    hooks: HookSet,
}

impl Request {
    /// Creates a new [`RequestBuilder`] from a resolved configuration.
    #[must_use]
    pub fn builder(method: Method, url: Url, effective: EffectiveConfig) -> RequestBuilder {
        RequestBuilder::new(method, url, effective)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Resolved absolute URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Merged headers (lowercase keys).
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Single header value by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Resolved timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Body source: empty, in-memory payload, or upload file.
    #[must_use]
    pub const fn body(&self) -> &Payload {
        &self.body
    }

    /// Download destination, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Hooks snapshotted at build time.
    #[must_use]
    pub const fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Take the per-call completion hook out of the snapshot.
    ///
    /// The dispatcher calls this once when setting up delivery.
    pub fn take_completion(&mut self) -> Option<CompletionHook> {
        self.hooks.completion.take()
    }
}

/// Builder producing [`Request`] snapshots. Pure construction, no side
/// effects; validation errors surface here, before any dispatch.
pub struct RequestBuilder {
    method: Method,
    url: Url,
    effective: EffectiveConfig,
    header_overrides: HashMap<String, String>,
    payload: Option<Bytes>,
    upload: Option<PathBuf>,
    destination: Option<PathBuf>,
    progress_override: Option<ProgressHook>,
    completion: Option<CompletionHook>,
}

impl RequestBuilder {
    /// Creates a new builder. `effective` is the node's configuration
    /// resolved at this instant; the built request keeps it as a snapshot.
    #[must_use]
    pub fn new(method: Method, url: Url, effective: EffectiveConfig) -> Self {
        Self {
            method,
            url,
            effective,
            header_overrides: HashMap::new(),
            payload: None,
            upload: None,
            destination: None,
            progress_override: None,
            completion: None,
        }
    }

    /// Sets a per-call header override. Caller wins on key collision with
    /// the node's effective headers.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.header_overrides
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets a structured byte payload.
    #[must_use]
    pub fn payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self.header("content-type", "application/json").payload(body))
    }

    /// Sets an upload source, streamed by the transport.
    #[must_use]
    pub fn upload(mut self, source: impl Into<PathBuf>) -> Self {
        self.upload = Some(source.into());
        self
    }

    /// Sets a download destination, streamed to by the transport.
    #[must_use]
    pub fn download_to(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Overrides the progress hook for this one call.
    #[must_use]
    pub fn on_progress(mut self, hook: ProgressHook) -> Self {
        self.progress_override = Some(hook);
        self
    }

    /// Sets the per-call completion hook (async dispatch only).
    #[must_use]
    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.completion = Some(hook);
        self
    }

    /// Builds the [`Request`], validating method/body compatibility.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMethodBody`] if the method does not admit a
    ///   structured payload and one was set.
    /// - [`Error::ConflictingBodySource`] if both a structured payload and
    ///   an upload source were set.
    pub fn build(self) -> Result<Request> {
        if self.payload.is_some() && self.upload.is_some() {
            return Err(Error::ConflictingBodySource);
        }
        if self.payload.is_some() && !self.method.allows_payload() {
            return Err(Error::InvalidMethodBody {
                method: self.method,
            });
        }

        let mut headers = self.effective.headers.clone();
        headers.extend(self.header_overrides);

        let body = match (self.payload, self.upload) {
            (Some(bytes), None) => Payload::Bytes(bytes),
            (None, Some(path)) => Payload::File(path),
            _ => Payload::Empty,
        };

        let hooks = HookSet {
            preflight: self.effective.preflight.clone(),
            progress: self
                .progress_override
                .or_else(|| self.effective.progress.clone()),
            post_process: self.effective.post_process.clone(),
            completion: self.completion,
        };

        Ok(Request {
            method: self.method,
            url: self.url,
            headers,
            timeout: self.effective.timeout_or_default(),
            body,
            destination: self.destination,
            hooks,
        })
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("header_overrides", &self.header_overrides)
            .field("payload", &self.payload.is_some())
            .field("upload", &self.upload)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert2::let_assert;

    use super::*;
    use crate::ResourceTree;

    fn effective() -> EffectiveConfig {
        EffectiveConfig::default()
    }

    fn url() -> Url {
        Url::parse("http://example.com/users").expect("valid URL")
    }

    #[test]
    fn get_with_payload_fails_before_dispatch() {
        let result = Request::builder(Method::Get, url(), effective())
            .payload(Bytes::from_static(b"{}"))
            .build();

        let_assert!(Err(Error::InvalidMethodBody { method }) = result);
        assert_eq!(method, Method::Get);
    }

    #[test]
    fn delete_with_payload_fails() {
        let result = Request::builder(Method::Delete, url(), effective())
            .payload(Bytes::from_static(b"x"))
            .build();

        let_assert!(Err(Error::InvalidMethodBody { .. }) = result);
    }

    #[test]
    fn payload_and_upload_conflict() {
        let result = Request::builder(Method::Post, url(), effective())
            .payload(Bytes::from_static(b"x"))
            .upload("/tmp/source.bin")
            .build();

        let_assert!(Err(Error::ConflictingBodySource) = result);
    }

    #[test]
    fn builder_debug_shows_payload_presence_not_hooks() {
        let builder = Request::builder(Method::Post, url(), effective())
            .payload(Bytes::from_static(b"x"))
            .on_progress(Arc::new(|_| {}))
            .on_complete(Box::new(|_| {}));

        let debug = format!("{builder:?}");
        assert!(debug.contains("payload: true"));
        assert!(debug.contains("Post"));
    }

    #[test]
    fn download_destination_is_independent() {
        let request = Request::builder(Method::Get, url(), effective())
            .download_to("/tmp/dest.bin")
            .build()
            .expect("build");

        assert!(request.body().is_empty());
        assert_eq!(request.destination(), Some(Path::new("/tmp/dest.bin")));
    }

    #[test]
    fn caller_header_wins_on_collision() {
        let mut config = EffectiveConfig::default();
        config.headers.insert("x-trace".to_string(), "node".to_string());
        config.headers.insert("accept".to_string(), "application/json".to_string());

        let request = Request::builder(Method::Get, url(), config)
            .header("X-Trace", "call")
            .build()
            .expect("build");

        assert_eq!(request.header("x-trace"), Some("call"));
        assert_eq!(request.header("Accept"), Some("application/json"));
    }

    #[test]
    fn json_sets_content_type() {
        #[derive(serde::Serialize)]
        struct User {
            name: String,
        }

        let request = Request::builder(Method::Post, url(), effective())
            .json(&User {
                name: "test".to_string(),
            })
            .expect("json")
            .build()
            .expect("build");

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert!(request.body().as_bytes().is_some());
    }

    #[test]
    fn snapshot_is_immune_to_later_tree_mutation() {
        let tree = ResourceTree::new();
        let root = tree.root(Url::parse("http://example.com").expect("url"));
        tree.set_header(root, "x-version", "1").expect("set");
        tree.set_timeout(root, Duration::from_secs(5)).expect("set");

        let resolved = tree.resolve(root).expect("resolve");
        let resolved_url = tree.resolve_url(root).expect("url");
        let request = Request::builder(Method::Get, resolved_url, resolved)
            .build()
            .expect("build");

        // mutate the node after the snapshot was taken
        tree.set_header(root, "x-version", "2").expect("set");
        tree.set_timeout(root, Duration::from_secs(60)).expect("set");

        assert_eq!(request.header("x-version"), Some("1"));
        assert_eq!(request.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn per_call_progress_override_takes_precedence() {
        let mut config = EffectiveConfig::default();
        config.progress = Some(Arc::new(|_| {}));

        let request = Request::builder(Method::Get, url(), config)
            .on_progress(Arc::new(|_| {}))
            .build()
            .expect("build");

        assert!(request.hooks().progress.is_some());
    }

    #[test]
    fn take_completion_consumes_the_hook() {
        let mut request = Request::builder(Method::Get, url(), effective())
            .on_complete(Box::new(|_| {}))
            .build()
            .expect("build");

        assert!(request.take_completion().is_some());
        assert!(request.take_completion().is_none());
    }
}
