//! Caller-facing client surface.
//!
//! [`RestClient`] ties the resource tree to a [`Dispatcher`] and hands out
//! [`Resource`] handles. Resources are cheap clones pointing into the shared
//! tree; configuration set on a resource is inherited by its descendants,
//! with the nearest override winning. Each call builds an immutable request
//! snapshot, so later tree mutations never affect requests already built.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use trellis_core::{
    CompletionHook, Method, NodeId, PostProcessHook, PreflightHook, ProgressHook, Request,
    RequestBuilder, ResourceTree, ResponseEnvelope, Result, Transport,
};
use url::Url;

use crate::dispatcher::{Dispatcher, RequestHandle};
use crate::transport::HyperTransport;

struct Shared {
    tree: ResourceTree,
    dispatcher: Dispatcher,
}

/// Entry point: a resource tree bound to a transport and a dispatcher.
///
/// ```no_run
/// use trellis::prelude::*;
///
/// # fn main() -> trellis::Result<()> {
/// let client = RestClient::new("https://api.example.com")?;
/// let users = client.root().child("users")?;
/// users.set_timeout(std::time::Duration::from_secs(5))?;
///
/// let response = users.child(42)?.get()?;
/// assert!(response.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RestClient {
    shared: Arc<Shared>,
    root: NodeId,
}

impl RestClient {
    /// Create a client over the default hyper transport.
    ///
    /// # Errors
    ///
    /// Fails when `base` is not a valid absolute URL, or when the transport
    /// runtime cannot be started.
    pub fn new(base: impl AsRef<str>) -> Result<Self> {
        let base = Url::parse(base.as_ref())?;
        let transport = Arc::new(HyperTransport::new()?);
        Ok(Self::with_transport(base, transport))
    }

    /// Create a client over a caller-supplied transport. This is how tests
    /// substitute a scripted transport for the real one.
    #[must_use]
    pub fn with_transport(base: Url, transport: Arc<dyn Transport>) -> Self {
        Self::with_dispatcher(base, Dispatcher::new(transport))
    }

    /// Create a client over a fully caller-assembled dispatcher.
    #[must_use]
    pub fn with_dispatcher(base: Url, dispatcher: Dispatcher) -> Self {
        debug!(base = %base, "creating client");
        let tree = ResourceTree::new();
        let root = tree.root(base);
        let shared = Arc::new(Shared { tree, dispatcher });
        Self { shared, root }
    }

    /// The root resource, addressing the base URL itself.
    #[must_use]
    pub fn root(&self) -> Resource {
        Resource {
            shared: Arc::clone(&self.shared),
            id: self.root,
        }
    }

    /// Stop the dispatcher contexts, draining queued completion hooks.
    pub fn shutdown(&self) {
        self.shared.dispatcher.shutdown();
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Handle to one node of the resource tree.
///
/// Clones are cheap and address the same node. A resource stays valid for
/// as long as its node (and every ancestor) is in the tree; operations on a
/// handle whose chain was released fail with [`trellis_core::Error::DanglingAncestor`].
#[derive(Clone)]
pub struct Resource {
    shared: Arc<Shared>,
    id: NodeId,
}

impl Resource {
    /// Append a path segment, creating a child resource.
    ///
    /// The segment is stringified and percent-encoded immediately; `"a/b"`
    /// becomes the single segment `a%2Fb`, not two.
    pub fn child(&self, segment: impl std::fmt::Display) -> Result<Self> {
        let id = self.shared.tree.child_of(self.id, segment)?;
        Ok(Self {
            shared: Arc::clone(&self.shared),
            id,
        })
    }

    /// Release this node's slot in the tree. Intended for transient
    /// single-use resources; handles to the released node or any of its
    /// descendants become dangling. Idempotent.
    pub fn release(&self) {
        self.shared.tree.release(self.id);
    }

    /// Set the timeout for this resource and its descendants.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.shared.tree.set_timeout(self.id, timeout)
    }

    /// Set a default header for this resource and its descendants. Header
    /// names are case-insensitive; the nearest setting wins.
    pub fn set_header(&self, name: impl AsRef<str>, value: impl Into<String>) -> Result<()> {
        self.shared.tree.set_header(self.id, name, value)
    }

    /// Install a preflight hook for this resource and its descendants.
    pub fn on_preflight(&self, hook: PreflightHook) -> Result<()> {
        self.shared.tree.set_preflight(self.id, hook)
    }

    /// Install a progress hook for this resource and its descendants.
    pub fn on_progress(&self, hook: ProgressHook) -> Result<()> {
        self.shared.tree.set_progress(self.id, hook)
    }

    /// Install a post-processing hook for this resource and its
    /// descendants.
    pub fn on_post_process(&self, hook: PostProcessHook) -> Result<()> {
        self.shared.tree.set_post_process(self.id, hook)
    }

    /// The URL this resource currently addresses.
    pub fn url(&self) -> Result<Url> {
        self.shared.tree.resolve_url(self.id)
    }

    /// Start building a request against this resource. Configuration is
    /// resolved *now*; the resulting request is a snapshot.
    pub fn request(&self, method: Method) -> Result<ResourceRequest> {
        let url = self.shared.tree.resolve_url(self.id)?;
        let effective = self.shared.tree.resolve(self.id)?;
        Ok(ResourceRequest {
            shared: Arc::clone(&self.shared),
            builder: Request::builder(method, url, effective),
        })
    }

    /// `GET` this resource and block for the envelope.
    pub fn get(&self) -> Result<ResponseEnvelope> {
        self.request(Method::Get)?.send()
    }

    /// `POST` a payload to this resource and block for the envelope.
    pub fn post(&self, payload: Bytes) -> Result<ResponseEnvelope> {
        self.request(Method::Post)?.payload(payload).send()
    }

    /// `PUT` a payload to this resource and block for the envelope.
    pub fn put(&self, payload: Bytes) -> Result<ResponseEnvelope> {
        self.request(Method::Put)?.payload(payload).send()
    }

    /// `DELETE` this resource and block for the envelope.
    pub fn delete(&self) -> Result<ResponseEnvelope> {
        self.request(Method::Delete)?.send()
    }

    /// `GET` this resource, writing the response body to `destination`.
    /// The envelope's result names the destination path instead of carrying
    /// bytes.
    pub fn download(&self, destination: impl Into<std::path::PathBuf>) -> Result<ResponseEnvelope> {
        self.request(Method::Get)?.download_to(destination).send()
    }

    /// `POST` the file at `source` to this resource, streaming it from
    /// disk.
    pub fn upload(&self, source: impl Into<std::path::PathBuf>) -> Result<ResponseEnvelope> {
        self.request(Method::Post)?.upload(source).send()
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Per-call request builder. Settings made here override the resource's
/// inherited configuration for this one call.
pub struct ResourceRequest {
    shared: Arc<Shared>,
    builder: RequestBuilder,
}

impl ResourceRequest {
    /// Set a header for this call only.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Attach an in-memory body.
    #[must_use]
    pub fn payload(mut self, payload: Bytes) -> Self {
        self.builder = self.builder.payload(payload);
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Result<Self> {
        self.builder = self.builder.json(value)?;
        Ok(self)
    }

    /// Stream the file at `source` as the body.
    #[must_use]
    pub fn upload(mut self, source: impl Into<std::path::PathBuf>) -> Self {
        self.builder = self.builder.upload(source);
        self
    }

    /// Write the response body to `destination` instead of buffering it.
    #[must_use]
    pub fn download_to(mut self, destination: impl Into<std::path::PathBuf>) -> Self {
        self.builder = self.builder.download_to(destination);
        self
    }

    /// Override the inherited progress hook for this call.
    #[must_use]
    pub fn on_progress(mut self, hook: ProgressHook) -> Self {
        self.builder = self.builder.on_progress(hook);
        self
    }

    /// Set the completion hook for this call. Only meaningful with
    /// [`dispatch`](Self::dispatch); [`send`](Self::send) returns the
    /// envelope instead.
    #[must_use]
    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.builder = self.builder.on_complete(hook);
        self
    }

    /// Dispatch and block until the request settles.
    ///
    /// # Errors
    ///
    /// Fails on snapshot validation (conflicting or disallowed bodies) and
    /// on [`trellis_core::Error::WouldDeadlock`] when called from the
    /// affinity context thread. Transport and HTTP failures do *not* fail
    /// this call; they are reported inside the returned envelope.
    pub fn send(self) -> Result<ResponseEnvelope> {
        let request = self.builder.build()?;
        self.shared.dispatcher.dispatch_blocking(request)
    }

    /// Dispatch without blocking. The envelope is delivered to the
    /// [`on_complete`](Self::on_complete) hook on the affinity context; the
    /// returned handle supports cancellation.
    ///
    /// # Errors
    ///
    /// Fails on snapshot validation, like [`send`](Self::send).
    pub fn dispatch(self) -> Result<RequestHandle> {
        let request = self.builder.build()?;
        Ok(self.shared.dispatcher.dispatch(request))
    }
}

impl std::fmt::Debug for ResourceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRequest").finish_non_exhaustive()
    }
}
