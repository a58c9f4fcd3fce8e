//! Request dispatch pipeline.
//!
//! The dispatcher owns the two execution contexts and drives the hook
//! chain around each request: preflight on the affinity context, transport
//! execution through the [`Transport`] collaborator, progress forwarded to
//! the affinity context with monotonic clamping, post-processing on the
//! worker pool, and exactly one completion per request delivered on the
//! affinity context (or returned directly for blocking dispatch).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use trellis_core::{
    CompletionHook, Error, Payload, PostProcessHook, PreflightHook, Progress, ProgressHook,
    Request, ResponseEnvelope, Result, Transport, TransportCall, TransportEvents, TransportHandle,
    TransportOutcome,
};

use crate::context::{SerialContext, WorkerPool};

/// How the final envelope leaves the pipeline.
enum Delivery {
    /// Async dispatch: invoke the per-call completion hook (if any) on the
    /// affinity context.
    Hook(Option<CompletionHook>),
    /// Blocking dispatch: signal the waiting caller thread.
    Channel(Sender<ResponseEnvelope>),
}

/// Mutable state of one in-flight request.
struct Flight {
    request: Mutex<Option<Request>>,
    delivery: Mutex<Option<Delivery>>,
    /// Hooks cloned out of the snapshot so they outlive `request` moving
    /// into the envelope.
    preflight: Option<PreflightHook>,
    progress: Option<ProgressHook>,
    post_process: Option<PostProcessHook>,
    cancelled: AtomicBool,
    /// Set when the completion is *enqueued*; guarantees exactly-once.
    delivered: AtomicBool,
    /// Set when the completion *runs* on the affinity thread; late
    /// progress jobs check it.
    finished: Arc<AtomicBool>,
    transport_handle: Mutex<Option<Box<dyn TransportHandle>>>,
    last_fraction: Mutex<f64>,
}

/// Handle to a dispatched request; cancellation is idempotent.
pub struct RequestHandle {
    flight: Arc<Flight>,
}

impl RequestHandle {
    /// Best-effort cancellation. Before preflight runs, the request is
    /// aborted outright; after transport start, the abort propagates to the
    /// transport. The completion still fires exactly once, with
    /// [`Error::Cancelled`]. Cancelling twice, or after completion, is a
    /// no-op.
    pub fn cancel(&self) {
        if self.flight.delivered.load(Ordering::Acquire) {
            return;
        }
        if self.flight.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("request cancelled");
        let guard = self
            .flight
            .transport_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            handle.cancel();
        }
    }

    /// `true` once the completion has been delivered (or handed to the
    /// affinity queue for delivery).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.flight.delivered.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

/// Executes request snapshots against a [`Transport`], orchestrating the
/// hook chain across the two execution contexts.
#[derive(Clone)]
pub struct Dispatcher {
    affinity: Arc<SerialContext>,
    workers: Arc<WorkerPool>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Create a dispatcher with freshly started default contexts.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_contexts(
            transport,
            Arc::new(SerialContext::start()),
            Arc::new(WorkerPool::start_default()),
        )
    }

    /// Create a dispatcher over caller-supplied contexts. Useful for tests
    /// and for callers that share contexts between dispatchers.
    #[must_use]
    pub fn with_contexts(
        transport: Arc<dyn Transport>,
        affinity: Arc<SerialContext>,
        workers: Arc<WorkerPool>,
    ) -> Self {
        Self {
            affinity,
            workers,
            transport,
        }
    }

    /// The serial affinity context.
    #[must_use]
    pub fn affinity(&self) -> &Arc<SerialContext> {
        &self.affinity
    }

    /// Dispatch asynchronously; returns immediately. The final envelope is
    /// delivered to the request's per-call completion hook on the affinity
    /// context, exactly once, success or failure.
    pub fn dispatch(&self, mut request: Request) -> RequestHandle {
        let completion = request.take_completion();
        self.launch(request, Delivery::Hook(completion))
    }

    /// Dispatch and block the calling thread until the completion step
    /// fires, then return the envelope directly. Preflight and progress
    /// hooks still run on the affinity context exactly as in the async
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldDeadlock`] when called from the affinity
    /// context thread itself; the caller and the affinity context must be
    /// independent threads.
    pub fn dispatch_blocking(&self, mut request: Request) -> Result<ResponseEnvelope> {
        if std::thread::current().id() == self.affinity.thread_id() {
            return Err(Error::WouldDeadlock);
        }
        // blocking form returns the envelope instead of invoking a
        // completion hook
        drop(request.take_completion());

        let (tx, rx) = channel();
        let _handle = self.launch(request, Delivery::Channel(tx));
        rx.recv()
            .map_err(|_| Error::transport("dispatcher stopped before completion"))
    }

    /// Stop both contexts. The affinity queue is drained first, so
    /// completion hooks for already-settled requests still fire.
    pub fn shutdown(&self) {
        // workers first: their jobs enqueue completions onto the affinity
        // queue, which is drained by its own shutdown
        self.workers.shutdown();
        self.affinity.shutdown();
    }

    fn launch(&self, request: Request, delivery: Delivery) -> RequestHandle {
        debug!(method = %request.method(), url = %request.url(), "dispatching request");
        let hooks = request.hooks();
        let flight = Arc::new(Flight {
            preflight: hooks.preflight.clone(),
            progress: hooks.progress.clone(),
            post_process: hooks.post_process.clone(),
            request: Mutex::new(Some(request)),
            delivery: Mutex::new(Some(delivery)),
            cancelled: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            finished: Arc::new(AtomicBool::new(false)),
            transport_handle: Mutex::new(None),
            last_fraction: Mutex::new(0.0),
        });

        let dispatcher = self.clone();
        let preflight_flight = Arc::clone(&flight);
        self.affinity
            .submit(move || dispatcher.run_preflight(&preflight_flight));

        RequestHandle { flight }
    }

    /// Runs on the affinity context.
    fn run_preflight(&self, flight: &Arc<Flight>) {
        if flight.cancelled.load(Ordering::Acquire) {
            self.finish(flight, None, Payload::Empty, Some(Error::Cancelled));
            return;
        }

        if let Some(hook) = &flight.preflight {
            let approved = flight
                .request
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|request| hook(request));
            if !approved {
                debug!("preflight hook rejected request");
                self.finish(flight, None, Payload::Empty, Some(Error::RejectedByPreflight));
                return;
            }
        }

        self.start_transport(flight);
    }

    fn start_transport(&self, flight: &Arc<Flight>) {
        let call = flight
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|request| TransportCall::from_request(request));
        let Some(call) = call else { return };

        let progress_dispatcher = self.clone();
        let progress_flight = Arc::clone(flight);
        let on_progress = Box::new(move |fraction: f64, destination: Option<&Path>| {
            let destination = destination.map(Path::to_path_buf);
            let flight = Arc::clone(&progress_flight);
            progress_dispatcher.affinity.submit(move || {
                Self::run_progress(&flight, fraction, destination);
            });
        });

        let complete_dispatcher = self.clone();
        let complete_flight = Arc::clone(flight);
        let on_complete = Box::new(move |outcome: TransportOutcome| {
            complete_dispatcher.on_transport_complete(&complete_flight, outcome);
        });

        let handle = self.transport.execute(
            call,
            TransportEvents {
                on_progress,
                on_complete,
            },
        );

        let mut guard = flight
            .transport_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let cancel_now = flight.cancelled.load(Ordering::Acquire);
        if cancel_now {
            handle.cancel();
        }
        *guard = Some(handle);
    }

    /// Runs on the affinity context.
    fn run_progress(flight: &Flight, fraction: f64, destination: Option<std::path::PathBuf>) {
        if flight.finished.load(Ordering::Acquire) || flight.cancelled.load(Ordering::Acquire) {
            return;
        }
        // fractions are monotonically non-decreasing per request
        let fraction = {
            let mut last = flight
                .last_fraction
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let clamped = fraction.max(*last);
            *last = clamped;
            clamped
        };
        if let Some(hook) = &flight.progress {
            hook(&Progress {
                fraction,
                destination,
            });
        }
    }

    /// Runs on a transport-owned thread or task. The outcome is routed
    /// through the affinity queue so every progress job already enqueued
    /// for this request runs before post-processing can start.
    fn on_transport_complete(&self, flight: &Arc<Flight>, outcome: TransportOutcome) {
        let dispatcher = self.clone();
        let flight = Arc::clone(flight);
        self.affinity
            .submit(move || dispatcher.process_outcome(&flight, outcome));
    }

    /// Runs on the affinity context, behind this request's progress jobs.
    fn process_outcome(&self, flight: &Arc<Flight>, outcome: TransportOutcome) {
        if flight.cancelled.load(Ordering::Acquire) {
            self.finish(flight, None, Payload::Empty, Some(Error::Cancelled));
            return;
        }

        if let Some(error) = outcome.error {
            warn!(error = %error, "transport failed");
            self.finish(flight, outcome.status, Payload::Empty, Some(error));
            return;
        }

        let status = outcome.status;
        let http_error = status
            .filter(|s| !(200_u16..300).contains(s))
            .map(Error::http);

        if let Some(hook) = flight.post_process.clone() {
            let dispatcher = self.clone();
            let flight = Arc::clone(flight);
            let payload = outcome.payload;
            self.workers.submit(move || {
                let transformed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    hook(payload)
                }));
                match transformed {
                    Ok(Ok(result)) => dispatcher.finish(&flight, status, result, http_error),
                    Ok(Err(error)) => dispatcher.finish(
                        &flight,
                        status,
                        Payload::Empty,
                        Some(Error::post_processing(error.to_string())),
                    ),
                    Err(_panic) => dispatcher.finish(
                        &flight,
                        status,
                        Payload::Empty,
                        Some(Error::post_processing("post-processing hook panicked")),
                    ),
                }
            });
        } else {
            self.finish(flight, status, outcome.payload, http_error);
        }
    }

    /// Enqueue the terminal step. Exactly one call wins, whatever path it
    /// arrives on.
    fn finish(
        &self,
        flight: &Arc<Flight>,
        status: Option<u16>,
        result: Payload,
        error: Option<Error>,
    ) {
        if flight.delivered.swap(true, Ordering::AcqRel) {
            return;
        }
        let request = flight
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(request) = request else { return };
        let delivery = flight
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let envelope = ResponseEnvelope::new(request, status, result, error);
        let finished = Arc::clone(&flight.finished);

        self.affinity.submit(move || {
            finished.store(true, Ordering::Release);
            debug!(
                status = envelope.status(),
                success = envelope.is_success(),
                "request settled"
            );
            match delivery {
                Some(Delivery::Hook(Some(hook))) => hook(envelope),
                Some(Delivery::Hook(None)) => {}
                Some(Delivery::Channel(tx)) => {
                    let _ = tx.send(envelope);
                }
                None => {}
            }
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("affinity", &self.affinity)
            .finish_non_exhaustive()
    }
}
