//! Lifecycle hook types.
//!
//! Four hooks surround each request, invoked in a fixed order: preflight →
//! progress (0..N) → post-processing → completion. The dispatcher alone
//! decides which execution context each hook runs on: preflight, progress,
//! and completion run on the serial affinity context; post-processing runs
//! on the worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use crate::{Payload, Request, ResponseEnvelope};

/// Gatekeeper invoked before any network activity. Returning `false` vetoes
/// the request; the completion still fires with
/// [`Error::RejectedByPreflight`](crate::Error::RejectedByPreflight).
pub type PreflightHook = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Invoked zero or more times during network activity with a monotonically
/// non-decreasing completion fraction.
pub type ProgressHook = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Error type a post-processing hook may return.
pub type PostProcessError = Box<dyn std::error::Error + Send + Sync>;

/// Transforms the raw transport result before it reaches completion. An
/// `Err` becomes the envelope's
/// [`Error::PostProcessingFailed`](crate::Error::PostProcessingFailed) and
/// the raw result is discarded.
pub type PostProcessHook =
    Arc<dyn Fn(Payload) -> std::result::Result<Payload, PostProcessError> + Send + Sync>;

/// Terminal callback, invoked exactly once per dispatched request.
///
/// Per-call only: blocking dispatch returns the envelope instead.
pub type CompletionHook = Box<dyn FnOnce(ResponseEnvelope) + Send + 'static>;

/// A normalized progress record forwarded to the progress hook.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Completion fraction in `0.0..=1.0`.
    pub fraction: f64,
    /// For downloads: the destination once fully written.
    pub destination: Option<PathBuf>,
}

impl Progress {
    /// Create a progress record with no destination.
    #[must_use]
    pub const fn at(fraction: f64) -> Self {
        Self {
            fraction,
            destination: None,
        }
    }
}

/// The hooks resolved for one request, snapshotted at build time.
///
/// Preflight, progress, and post-processing come from the node's effective
/// configuration (with per-call overrides); completion is per-call only.
#[derive(Default)]
pub struct HookSet {
    /// Preflight gatekeeper.
    pub preflight: Option<PreflightHook>,
    /// Progress observer.
    pub progress: Option<ProgressHook>,
    /// Result transform.
    pub post_process: Option<PostProcessHook>,
    /// Terminal callback (async dispatch only).
    pub completion: Option<CompletionHook>,
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("preflight", &self.preflight.is_some())
            .field("progress", &self.progress.is_some())
            .field("post_process", &self.post_process.is_some())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_at() {
        let progress = Progress::at(0.5);
        assert!((progress.fraction - 0.5).abs() < f64::EPSILON);
        assert!(progress.destination.is_none());
    }

    #[test]
    fn hook_set_debug_shows_presence() {
        let hooks = HookSet {
            preflight: Some(Arc::new(|_| true)),
            ..HookSet::default()
        };
        let debug = format!("{hooks:?}");
        assert!(debug.contains("preflight: true"));
        assert!(debug.contains("completion: false"));
    }
}
