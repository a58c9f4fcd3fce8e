//! Hyper-backed transport implementation.
//!
//! [`HyperTransport`] owns a small tokio runtime and a hyper-util client;
//! each call runs as an abortable task on that runtime, so `execute` never
//! blocks the dispatcher. Timeouts are enforced here, per the request's
//! resolved timeout, and surface as transport-level errors. Upload sources
//! are streamed chunk-by-chunk, download destinations are written
//! frame-by-frame; neither buffers the whole payload in memory.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{AbortHandle, Abortable};
use http_body::Frame;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use trellis_core::{
    Error, Method, Payload, ProgressFn, Result, Transport, TransportCall, TransportEvents,
    TransportHandle, TransportOutcome,
};

/// Chunk size for streamed uploads.
const UPLOAD_CHUNK: usize = 64 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type TransportBody = BoxBody<Bytes, BoxError>;

/// HTTP transport over hyper-util with rustls TLS.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, TransportBody>,
    runtime: tokio::runtime::Runtime,
}

impl HyperTransport {
    /// Create a transport with its own two-thread runtime.
    ///
    /// TLS uses rustls with the Mozilla root set; plain-http URLs stay
    /// unencrypted so local test servers work.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be started.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("trellis-transport")
            .enable_all()
            .build()
            .map_err(|e| Error::transport(format!("failed to start transport runtime: {e}")))?;

        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let tls = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self { client, runtime })
    }

    fn http_method(method: Method) -> http::Method {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
            Method::Patch => http::Method::PATCH,
            Method::Head => http::Method::HEAD,
            Method::Options => http::Method::OPTIONS,
        }
    }

    fn full_body(bytes: Bytes) -> TransportBody {
        Full::new(bytes)
            .map_err(|never| -> BoxError { match never {} })
            .boxed()
    }

    /// Body that streams a file in chunks, reporting sent/total progress.
    async fn upload_body(
        source: PathBuf,
        progress: Arc<ProgressFn>,
    ) -> Result<TransportBody> {
        let file = tokio::fs::File::open(&source)
            .await
            .map_err(|e| Error::transport(format!("failed to open upload source: {e}")))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| Error::transport(format!("failed to stat upload source: {e}")))?
            .len();

        let stream = futures_util::stream::unfold(
            (file, 0_u64),
            move |(mut file, sent)| {
                let progress = Arc::clone(&progress);
                async move {
                    let mut buf = vec![0_u8; UPLOAD_CHUNK];
                    match file.read(&mut buf).await {
                        Ok(0) => None,
                        Ok(n) => {
                            buf.truncate(n);
                            let sent = sent + n as u64;
                            if total > 0 {
                                #[allow(clippy::cast_precision_loss)]
                                (progress)((sent as f64 / total as f64).min(1.0), None);
                            }
                            Some((Ok(Frame::data(Bytes::from(buf))), (file, sent)))
                        }
                        Err(e) => Some((Err(BoxError::from(e)), (file, sent))),
                    }
                }
            },
        );

        Ok(StreamBody::new(stream).boxed())
    }

    async fn perform(
        client: Client<HttpsConnector<HttpConnector>, TransportBody>,
        call: TransportCall,
        progress: Arc<ProgressFn>,
    ) -> Result<TransportOutcome> {
        let mut builder = http::Request::builder()
            .method(Self::http_method(call.method))
            .uri(call.url.as_str());
        for (name, value) in &call.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = match call.body {
            Payload::Empty => Self::full_body(Bytes::new()),
            Payload::Bytes(bytes) => Self::full_body(bytes),
            Payload::File(source) => Self::upload_body(source, Arc::clone(&progress)).await?,
        };
        let request = builder
            .body(body)
            .map_err(|e| Error::transport(format!("invalid request: {e}")))?;

        let response = client
            .request(request)
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let total = response
            .headers()
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|len| *len > 0);

        let mut body = response.into_body();
        let payload = if let Some(destination) = call.destination {
            let mut file = tokio::fs::File::create(&destination)
                .await
                .map_err(|e| Error::transport(format!("failed to create destination: {e}")))?;

            let mut written = 0_u64;
            while let Some(next) = body.frame().await {
                let frame = next.map_err(|e| Error::transport(e.to_string()))?;
                if let Ok(data) = frame.into_data() {
                    file.write_all(&data)
                        .await
                        .map_err(|e| Error::transport(format!("failed to write destination: {e}")))?;
                    written += data.len() as u64;
                    if let Some(total) = total {
                        #[allow(clippy::cast_precision_loss)]
                        (progress)((written as f64 / total as f64).min(1.0), None);
                    }
                }
            }
            file.flush()
                .await
                .map_err(|e| Error::transport(format!("failed to flush destination: {e}")))?;

            // the destination is complete; the final progress event carries it
            (progress)(1.0, Some(destination.as_path()));
            debug!(bytes = written, destination = %destination.display(), "download complete");
            Payload::File(destination)
        } else {
            let mut collected = Vec::new();
            while let Some(next) = body.frame().await {
                let frame = next.map_err(|e| Error::transport(e.to_string()))?;
                if let Ok(data) = frame.into_data() {
                    collected.extend_from_slice(&data);
                    if let Some(total) = total {
                        #[allow(clippy::cast_precision_loss)]
                        (progress)((collected.len() as f64 / total as f64).min(1.0), None);
                    }
                }
            }
            Payload::Bytes(Bytes::from(collected))
        };

        Ok(TransportOutcome::response(status, payload))
    }

    async fn run(
        client: Client<HttpsConnector<HttpConnector>, TransportBody>,
        call: TransportCall,
        progress: Arc<ProgressFn>,
    ) -> TransportOutcome {
        let timeout = call.timeout;
        match tokio::time::timeout(timeout, Self::perform(client, call, progress)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => TransportOutcome::failure(error),
            Err(_elapsed) => TransportOutcome::failure(Error::transport("request timed out")),
        }
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl Transport for HyperTransport {
    fn execute(&self, call: TransportCall, events: TransportEvents) -> Box<dyn TransportHandle> {
        let (abort, registration) = AbortHandle::new_pair();
        let client = self.client.clone();
        let progress: Arc<ProgressFn> = Arc::new(events.on_progress);
        let on_complete = events.on_complete;

        self.runtime.spawn(async move {
            let work = Self::run(client, call, progress);
            let outcome = match Abortable::new(work, registration).await {
                Ok(outcome) => outcome,
                Err(_aborted) => TransportOutcome::failure(Error::Cancelled),
            };
            on_complete(outcome);
        });

        Box::new(AbortableHandle { abort })
    }
}

struct AbortableHandle {
    abort: AbortHandle,
}

impl TransportHandle for AbortableHandle {
    fn cancel(&self) {
        self.abort.abort();
    }
}
