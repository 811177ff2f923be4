//! Normalized change events.

use crate::core::path::TreePath;
use crate::store::node::RawNode;
use crate::store::path_store::CacheSnapshot;
use std::sync::Arc;

/// A change notification normalized by the stream adapter.
///
/// Events for the same path arrive in the order the remote store generated
/// them; events for different paths may interleave arbitrarily. A
/// [`ChangeEvent::Resynced`] carries a complete subtree snapshot and
/// supersedes everything delivered before it.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A node came into existence.
    Created(Arc<RawNode>),
    /// A node's content changed.
    Updated(Arc<RawNode>),
    /// A node was removed.
    Deleted(TreePath),
    /// A full-sweep baseline, emitted at start and after reconnects.
    Resynced(CacheSnapshot),
}

impl ChangeEvent {
    /// The path this event concerns, or `None` for a resync.
    pub fn path(&self) -> Option<&TreePath> {
        match self {
            Self::Created(node) | Self::Updated(node) => Some(&node.path),
            Self::Deleted(path) => Some(path),
            Self::Resynced(_) => None,
        }
    }
}
