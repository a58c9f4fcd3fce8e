//! Per-resource configuration.
//!
//! [`ConfigSet`] is the sparse, inheritable settings attached to one node of
//! the resource tree. An unset field means "inherit from parent", never
//! "reset to default"; defaults apply only at the root, during resolution
//! into an [`EffectiveConfig`].

use std::collections::HashMap;
use std::time::Duration;

use crate::hooks::{PostProcessHook, PreflightHook, ProgressHook};

/// Timeout applied when no node in the chain sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sparse per-node settings. Pure data, no behavior.
#[derive(Clone, Default)]
pub struct ConfigSet {
    timeout: Option<Duration>,
    headers: HashMap<String, String>,
    preflight: Option<PreflightHook>,
    progress: Option<ProgressHook>,
    post_process: Option<PostProcessHook>,
}

impl ConfigSet {
    /// Create an empty configuration (everything inherited).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout for this node and its descendants.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Set a header for this node and its descendants.
    ///
    /// Header names are case-insensitive; keys are normalized to lowercase.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Set the preflight hook.
    pub fn set_preflight(&mut self, hook: PreflightHook) {
        self.preflight = Some(hook);
    }

    /// Set the progress hook.
    pub fn set_progress(&mut self, hook: ProgressHook) {
        self.progress = Some(hook);
    }

    /// Set the post-processing hook.
    pub fn set_post_process(&mut self, hook: PostProcessHook) {
        self.post_process = Some(hook);
    }

    /// Timeout override, if set on this node.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Headers set on this node (lowercase keys).
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Preflight hook, if set on this node.
    #[must_use]
    pub fn preflight(&self) -> Option<&PreflightHook> {
        self.preflight.as_ref()
    }

    /// Progress hook, if set on this node.
    #[must_use]
    pub fn progress(&self) -> Option<&ProgressHook> {
        self.progress.as_ref()
    }

    /// Post-processing hook, if set on this node.
    #[must_use]
    pub fn post_process(&self) -> Option<&PostProcessHook> {
        self.post_process.as_ref()
    }
}

impl std::fmt::Debug for ConfigSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSet")
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("preflight", &self.preflight.is_some())
            .field("progress", &self.progress.is_some())
            .field("post_process", &self.post_process.is_some())
            .finish()
    }
}

/// The fully merged configuration for a node after inheritance resolution.
///
/// Produced by [`ResourceTree::resolve`](crate::ResourceTree::resolve):
/// nearest-override-wins per field, walking from the node to the root, with
/// defaults filling anything still unset.
#[derive(Clone, Default)]
pub struct EffectiveConfig {
    /// Resolved request timeout.
    pub timeout: Option<Duration>,
    /// Merged headers, child entries winning per key (lowercase keys).
    pub headers: HashMap<String, String>,
    /// Nearest preflight hook, if any.
    pub preflight: Option<PreflightHook>,
    /// Nearest progress hook, if any.
    pub progress: Option<ProgressHook>,
    /// Nearest post-processing hook, if any.
    pub post_process: Option<PostProcessHook>,
}

impl EffectiveConfig {
    /// Overlay one node's settings onto an ancestor-resolved configuration.
    ///
    /// Called root-first during resolution, so the node applied last (the
    /// deepest) wins on every field it sets.
    pub fn apply(&mut self, config: &ConfigSet) {
        if let Some(timeout) = config.timeout() {
            self.timeout = Some(timeout);
        }
        for (name, value) in config.headers() {
            self.headers.insert(name.clone(), value.clone());
        }
        if let Some(hook) = config.preflight() {
            self.preflight = Some(hook.clone());
        }
        if let Some(hook) = config.progress() {
            self.progress = Some(hook.clone());
        }
        if let Some(hook) = config.post_process() {
            self.post_process = Some(hook.clone());
        }
    }

    /// Resolved timeout, falling back to [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn timeout_or_default(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

impl std::fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("preflight", &self.preflight.is_some())
            .field("progress", &self.progress.is_some())
            .field("post_process", &self.post_process.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn header_keys_are_case_insensitive() {
        let mut config = ConfigSet::new();
        config.set_header("X-Api-Key", "1");
        config.set_header("x-api-key", "2");

        assert_eq!(config.headers().len(), 1);
        assert_eq!(config.headers().get("x-api-key").map(String::as_str), Some("2"));
    }

    #[test]
    fn apply_nearest_override_wins() {
        let mut parent = ConfigSet::new();
        parent.set_timeout(Duration::from_secs(10));
        parent.set_header("x-trace", "root");
        parent.set_header("accept", "application/json");

        let mut child = ConfigSet::new();
        child.set_header("x-trace", "child");

        let mut effective = EffectiveConfig::default();
        effective.apply(&parent);
        effective.apply(&child);

        // child wins on collision, parent fields survive otherwise
        assert_eq!(effective.timeout, Some(Duration::from_secs(10)));
        assert_eq!(effective.headers.get("x-trace").map(String::as_str), Some("child"));
        assert_eq!(
            effective.headers.get("accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn unset_fields_inherit() {
        let mut parent = ConfigSet::new();
        parent.set_preflight(Arc::new(|_| true));

        let child = ConfigSet::new();

        let mut effective = EffectiveConfig::default();
        effective.apply(&parent);
        effective.apply(&child);

        assert!(effective.preflight.is_some());
        assert_eq!(effective.timeout_or_default(), DEFAULT_TIMEOUT);
    }
}
