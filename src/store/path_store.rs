//! In-memory path-addressed node store.
//!
//! [`PathStore`] is pure data: an ordered map from path to shared node
//! snapshot. It performs no I/O and owns no lock; the cache that embeds it
//! funnels all mutation through a single logical writer and wraps the store
//! for concurrent readers. Because paths order by segment sequence, every
//! subtree is a contiguous key range and recursive scans are range scans.

use crate::core::path::TreePath;
use crate::store::node::RawNode;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

/// Point-in-time mapping of a subtree's contents.
///
/// Values are shared snapshots; the copy is cheap and readers must treat it
/// as immutable.
pub type CacheSnapshot = BTreeMap<TreePath, Arc<RawNode>>;

/// Ordered in-memory mirror of the watched subtree.
#[derive(Debug, Default)]
pub struct PathStore {
    entries: BTreeMap<TreePath, Arc<RawNode>>,
}

impl PathStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for `path`, if present.
    pub fn get(&self, path: &TreePath) -> Option<Arc<RawNode>> {
        self.entries.get(path).cloned()
    }

    /// Insert or replace the entry for the node's path.
    pub fn put(&mut self, node: Arc<RawNode>) -> Option<Arc<RawNode>> {
        self.entries.insert(node.path.clone(), node)
    }

    /// Remove the entry for `path`, returning the displaced snapshot.
    pub fn remove(&mut self, path: &TreePath) -> Option<Arc<RawNode>> {
        self.entries.remove(path)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Recursive snapshot of `root` and everything beneath it.
    pub fn snapshot_under(&self, root: &TreePath) -> CacheSnapshot {
        self.range_under(root)
            .map(|(path, node)| (path.clone(), Arc::clone(node)))
            .collect()
    }

    /// Paths of the direct children of `path`.
    pub fn children(&self, path: &TreePath) -> BTreeSet<TreePath> {
        self.range_under(path)
            .filter(|(candidate, _)| path.is_parent_of(candidate))
            .map(|(candidate, _)| candidate.clone())
            .collect()
    }

    /// Replace the contents of the subtree at `root` with `snapshot`,
    /// returning the displaced entries.
    ///
    /// Entries outside the subtree are untouched. Used by resync
    /// application, where the sweep result is the new truth for the
    /// watched range.
    pub fn replace_under(&mut self, root: &TreePath, snapshot: CacheSnapshot) -> CacheSnapshot {
        let displaced: Vec<TreePath> = self.range_under(root).map(|(p, _)| p.clone()).collect();
        let mut old = CacheSnapshot::new();
        for path in displaced {
            if let Some(node) = self.entries.remove(&path) {
                old.insert(path, node);
            }
        }
        for (path, node) in snapshot {
            debug_assert!(path.starts_with(root));
            self.entries.insert(path, node);
        }
        old
    }

    fn range_under<'a>(
        &'a self,
        root: &'a TreePath,
    ) -> impl Iterator<Item = (&'a TreePath, &'a Arc<RawNode>)> {
        self.entries
            .range((Bound::Included(root.clone()), Bound::Unbounded))
            .take_while(move |(path, _)| path.starts_with(root))
    }
}
