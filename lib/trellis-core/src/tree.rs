//! The resource tree.
//!
//! Resources form a tree of URL path segments with inheritable
//! configuration. The tree is an arena: every node lives in one
//! [`ResourceTree`] and is addressed by a stable, generation-tagged
//! [`NodeId`]. Nodes store an optional parent id; the arena owns all nodes,
//! no node owns another, and there are no pointer cycles.
//!
//! Resolution re-reads current ancestor state on every call, so mutating a
//! shared parent is visible to new requests from all children immediately.
//! Requests already built are snapshots and never affected.

use std::fmt::Display;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

use crate::config::{ConfigSet, EffectiveConfig};
use crate::hooks::{PostProcessHook, PreflightHook, ProgressHook};
use crate::{Error, Result};

/// Characters escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Stable identifier of a node in a [`ResourceTree`].
///
/// Ids are generation-tagged: once a node is released, its id (and the ids
/// of any stale copies) resolve to
/// [`Error::DanglingAncestor`](crate::Error::DanglingAncestor) instead of
/// aliasing a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    /// URL-escaped path segment; `None` for roots.
    segment: Option<String>,
    /// Base URL; `Some` only for roots.
    base: Option<Url>,
    config: ConfigSet,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.node = Some(node);
                return NodeId {
                    index,
                    generation: slot.generation,
                };
            }
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(Error::DanglingAncestor)
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(Error::DanglingAncestor)
    }

    /// Chain of ids from the node up to its root, node first.
    fn chain(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.get(node_id)?;
            chain.push(node_id);
            current = node.parent;
        }
        Ok(chain)
    }
}

/// Arena of resource nodes with inheritance resolution.
///
/// Structural access goes through an internal `RwLock`: resolution takes a
/// read lock and clones the merged configuration out, which is what makes
/// request snapshots immune to later mutation. Concurrent configuration
/// mutation of the *same* node from multiple threads still requires caller
/// coordination; the lock guards structural integrity, not field-level
/// update ordering.
#[derive(Debug, Default)]
pub struct ResourceTree {
    inner: RwLock<Arena>,
}

impl ResourceTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root node from a base URL.
    pub fn root(&self, base: Url) -> NodeId {
        let mut arena = self.write();
        arena.insert(Node {
            parent: None,
            segment: None,
            base: Some(base),
            config: ConfigSet::new(),
        })
    }

    /// Create a child of `parent` for one path segment.
    ///
    /// The segment is converted to its canonical URL-escaped string here,
    /// at creation time, and is immutable afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingAncestor`] if `parent` or any of its
    /// ancestors has been released.
    pub fn child_of(&self, parent: NodeId, segment: impl Display) -> Result<NodeId> {
        let escaped = utf8_percent_encode(&segment.to_string(), SEGMENT).to_string();
        let mut arena = self.write();
        arena.chain(parent)?;
        Ok(arena.insert(Node {
            parent: Some(parent),
            segment: Some(escaped),
            base: None,
            config: ConfigSet::new(),
        }))
    }

    /// Release a node, vacating its slot.
    ///
    /// Intended for transient single-use resources. Releasing a node that
    /// still has descendants makes those descendants unresolvable
    /// ([`Error::DanglingAncestor`]). Releasing twice is a no-op.
    pub fn release(&self, id: NodeId) {
        let mut arena = self.write();
        if let Some(slot) = arena.slots.get_mut(id.index as usize)
            && slot.generation == id.generation
            && slot.node.is_some()
        {
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            arena.free.push(id.index);
        }
    }

    /// Set the timeout on a node's own configuration.
    pub fn set_timeout(&self, id: NodeId, timeout: Duration) -> Result<()> {
        self.write().get_mut(id)?.config.set_timeout(timeout);
        Ok(())
    }

    /// Set a header on a node's own configuration (case-insensitive name).
    pub fn set_header(&self, id: NodeId, name: impl AsRef<str>, value: impl Into<String>) -> Result<()> {
        self.write().get_mut(id)?.config.set_header(name, value);
        Ok(())
    }

    /// Set the preflight hook on a node's own configuration.
    pub fn set_preflight(&self, id: NodeId, hook: PreflightHook) -> Result<()> {
        self.write().get_mut(id)?.config.set_preflight(hook);
        Ok(())
    }

    /// Set the progress hook on a node's own configuration.
    pub fn set_progress(&self, id: NodeId, hook: ProgressHook) -> Result<()> {
        self.write().get_mut(id)?.config.set_progress(hook);
        Ok(())
    }

    /// Set the post-processing hook on a node's own configuration.
    pub fn set_post_process(&self, id: NodeId, hook: PostProcessHook) -> Result<()> {
        self.write().get_mut(id)?.config.set_post_process(hook);
        Ok(())
    }

    /// Resolve the effective configuration for a node.
    ///
    /// Walks the ancestors once: for each field the nearest non-absent
    /// value wins, starting from the node itself; headers merge per key the
    /// same way. Nothing is cached across mutations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingAncestor`] if the node or any ancestor has
    /// been released.
    pub fn resolve(&self, id: NodeId) -> Result<EffectiveConfig> {
        let arena = self.read();
        let chain = arena.chain(id)?;

        let mut effective = EffectiveConfig::default();
        // root first, so the deepest override applied last wins
        for node_id in chain.iter().rev() {
            let node = arena.get(*node_id)?;
            effective.apply(&node.config);
        }
        Ok(effective)
    }

    /// Resolve the absolute URL for a node.
    ///
    /// The result is the root's base URL with the `/`-joined, left-to-right
    /// sequence of (already escaped) segments appended to its path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingAncestor`] if the node or any ancestor has
    /// been released.
    pub fn resolve_url(&self, id: NodeId) -> Result<Url> {
        let arena = self.read();
        let chain = arena.chain(id)?;

        let mut segments = Vec::new();
        let mut base = None;
        for node_id in chain.iter().rev() {
            let node = arena.get(*node_id)?;
            if let Some(url) = &node.base {
                base = Some(url.clone());
            }
            if let Some(segment) = &node.segment {
                segments.push(segment.as_str());
            }
        }

        // every chain terminates at a root carrying a base URL
        let mut url = base.ok_or(Error::DanglingAncestor)?;
        if !segments.is_empty() {
            let path = format!("{}/{}", url.path().trim_end_matches('/'), segments.join("/"));
            url.set_path(&path);
        }
        Ok(url)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Arena> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Arena> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.com").expect("valid URL")
    }

    #[test]
    fn root_resolves_to_defaults() {
        let tree = ResourceTree::new();
        let root = tree.root(base());

        let effective = tree.resolve(root).expect("resolve");
        assert_eq!(effective.timeout, None);
        assert_eq!(effective.timeout_or_default(), crate::config::DEFAULT_TIMEOUT);
        assert!(effective.headers.is_empty());
        assert!(effective.preflight.is_none());
    }

    #[test]
    fn child_inherits_and_overrides() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        tree.set_header(root, "X", "1").expect("set header");

        let users = tree.child_of(root, "users").expect("child");
        tree.set_timeout(users, Duration::from_secs(5)).expect("set timeout");

        let effective = tree.resolve(users).expect("resolve");
        assert_eq!(effective.headers.get("x").map(String::as_str), Some("1"));
        assert_eq!(effective.timeout, Some(Duration::from_secs(5)));

        let url = tree.resolve_url(users).expect("url");
        assert_eq!(url.as_str(), "http://example.com/users");
    }

    #[test]
    fn nearest_override_wins_over_all_ancestors() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        tree.set_timeout(root, Duration::from_secs(1)).expect("set");
        tree.set_header(root, "x-level", "root").expect("set");

        let mid = tree.child_of(root, "a").expect("child");
        tree.set_timeout(mid, Duration::from_secs(2)).expect("set");

        let leaf = tree.child_of(mid, "b").expect("child");
        tree.set_header(leaf, "X-Level", "leaf").expect("set");

        let effective = tree.resolve(leaf).expect("resolve");
        assert_eq!(effective.timeout, Some(Duration::from_secs(2)));
        assert_eq!(effective.headers.get("x-level").map(String::as_str), Some("leaf"));
    }

    #[test]
    fn parent_mutation_visible_to_new_resolutions() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let child = tree.child_of(root, "users").expect("child");

        assert!(tree.resolve(child).expect("resolve").headers.is_empty());

        tree.set_header(root, "x-new", "yes").expect("set");
        let effective = tree.resolve(child).expect("resolve");
        assert_eq!(effective.headers.get("x-new").map(String::as_str), Some("yes"));
    }

    #[test]
    fn segments_are_escaped_independently() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let spaced = tree.child_of(root, "my files").expect("child");
        let slashed = tree.child_of(spaced, "a/b").expect("child");

        let url = tree.resolve_url(slashed).expect("url");
        assert_eq!(url.as_str(), "http://example.com/my%20files/a%2Fb");
    }

    #[test]
    fn numeric_segments_stringify_at_creation() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let users = tree.child_of(root, "users").expect("child");
        let user = tree.child_of(users, 42).expect("child");

        let url = tree.resolve_url(user).expect("url");
        assert_eq!(url.as_str(), "http://example.com/users/42");
    }

    #[test]
    fn base_url_with_path_prefix() {
        let tree = ResourceTree::new();
        let root = tree.root(Url::parse("http://example.com/api/v2").expect("url"));
        let users = tree.child_of(root, "users").expect("child");

        let url = tree.resolve_url(users).expect("url");
        assert_eq!(url.as_str(), "http://example.com/api/v2/users");
    }

    #[test]
    fn released_ancestor_dangles() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let child = tree.child_of(root, "users").expect("child");

        tree.release(root);

        assert!(matches!(tree.resolve(child), Err(Error::DanglingAncestor)));
        assert!(matches!(tree.resolve_url(child), Err(Error::DanglingAncestor)));
    }

    #[test]
    fn child_of_checks_the_whole_ancestor_chain() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let parent = tree.child_of(root, "sessions").expect("child");
        let leaf = tree.child_of(parent, "current").expect("child");

        tree.release(parent);

        // the leaf's own slot is intact, but its chain is broken; growing
        // the tree under it must fail even if the freed slot was recycled
        let recycled = tree.child_of(root, "replacement").expect("child");
        assert!(tree.resolve(recycled).is_ok());
        assert!(matches!(
            tree.child_of(leaf, "deeper"),
            Err(Error::DanglingAncestor)
        ));
    }

    #[test]
    fn stale_id_does_not_alias_recycled_slot() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let child = tree.child_of(root, "old").expect("child");

        tree.release(child);
        let replacement = tree.child_of(root, "new").expect("child");

        // the replacement reuses the slot, the stale id must not see it
        assert!(matches!(tree.resolve(child), Err(Error::DanglingAncestor)));
        assert!(tree.resolve(replacement).is_ok());
    }

    #[test]
    fn release_is_idempotent() {
        let tree = ResourceTree::new();
        let root = tree.root(base());
        let child = tree.child_of(root, "users").expect("child");

        tree.release(child);
        tree.release(child);

        assert!(tree.resolve(root).is_ok());
    }
}
