//! Execution contexts for hook invocation.
//!
//! Two contexts exist, per the dispatch pipeline's contract:
//!
//! - [`SerialContext`] (the "affinity" context): one dedicated thread,
//!   strictly FIFO. Preflight, progress, and completion hooks run here,
//!   each to completion before the next queued item.
//! - [`WorkerPool`]: a fixed set of threads with no ordering guarantee
//!   across jobs. Post-processing hooks run here so expensive transforms
//!   never block the affinity context.
//!
//! Both are explicit, injectable objects with a start/drain/stop lifecycle
//! rather than ambient singletons, so tests can substitute them.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};

use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Strictly serialized execution context backed by one dedicated thread.
pub struct SerialContext {
    tx: Sender<Message>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialContext {
    /// Start the context thread.
    #[must_use]
    pub fn start() -> Self {
        let (tx, rx) = channel::<Message>();
        let handle = std::thread::spawn(move || {
            debug!("affinity context started");
            while let Ok(message) = rx.recv() {
                match message {
                    Message::Run(job) => job(),
                    Message::Stop => break,
                }
            }
            debug!("affinity context stopped");
        });
        let thread_id = handle.thread().id();
        Self {
            tx,
            thread_id,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Enqueue a job. Jobs run in submission order, each to completion
    /// before the next.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Message::Run(Box::new(job))).is_err() {
            warn!("affinity context is stopped, job dropped");
        }
    }

    /// Block until every job enqueued before this call has run.
    pub fn drain(&self) {
        let (done_tx, done_rx) = channel();
        if self.tx.send(Message::Run(Box::new(move || {
            let _ = done_tx.send(());
        }))).is_err()
        {
            return;
        }
        let _ = done_rx.recv();
    }

    /// Id of the context thread, for deadlock guards.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Process every queued job, then stop the thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Stop);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && std::thread::current().id() != self.thread_id
        {
            let _ = handle.join();
        }
    }
}

impl Drop for SerialContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialContext")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

/// Concurrent execution context backed by a fixed pool of threads.
pub struct WorkerPool {
    tx: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `size` worker threads (at least one).
    #[must_use]
    pub fn start(size: usize) -> Self {
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..size.max(1))
            .map(|_| {
                let rx = Arc::clone(&rx);
                std::thread::spawn(move || Self::run(&rx))
            })
            .collect();
        Self {
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        }
    }

    /// Start one worker per available CPU.
    #[must_use]
    pub fn start_default() -> Self {
        let size = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
        Self::start(size)
    }

    fn run(rx: &Mutex<Receiver<Job>>) {
        loop {
            // hold the lock only while receiving, not while running the job
            let job = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
            match job {
                Ok(job) => job(),
                Err(_) => break,
            }
        }
    }

    /// Enqueue a job onto any free worker. No ordering guarantee across
    /// jobs.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) if tx.send(Box::new(job)).is_ok() => {}
            _ => warn!("worker pool is stopped, job dropped"),
        }
    }

    /// Finish queued jobs and stop all workers.
    pub fn shutdown(&self) {
        // dropping the sender lets workers drain the queue and exit
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if std::thread::current().id() != handle.thread().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn serial_context_runs_jobs_in_submission_order() {
        let context = SerialContext::start();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let order = Arc::clone(&order);
            context.submit(move || {
                order.lock().unwrap_or_else(PoisonError::into_inner).push(i);
            });
        }
        context.drain();

        let seen = order.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn serial_context_jobs_run_off_caller_thread() {
        let context = SerialContext::start();
        let caller = std::thread::current().id();
        let (tx, rx) = channel();

        context.submit(move || {
            let _ = tx.send(std::thread::current().id());
        });

        let worker = rx.recv().expect("job ran");
        assert_ne!(worker, caller);
        assert_eq!(worker, context.thread_id());
    }

    #[test]
    fn shutdown_drains_queued_jobs_first() {
        let context = SerialContext::start();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            context.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        context.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn worker_pool_runs_every_job() {
        let pool = WorkerPool::start(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..200 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn submit_after_shutdown_is_a_quiet_no_op() {
        let context = SerialContext::start();
        context.shutdown();
        context.submit(|| {});

        let pool = WorkerPool::start(2);
        pool.shutdown();
        pool.submit(|| {});
    }
}
