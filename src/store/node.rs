//! Node snapshots and version metadata.
//!
//! A [`RawNode`] is the unit of cache state: path, opaque payload, and
//! [`Stat`] bound together at construction and never mutated afterwards.
//! Every remote mutation produces a new `Arc<RawNode>` that replaces the
//! prior entry wholesale, so a concurrent reader always observes a payload
//! and stat that belong together.

use crate::core::path::TreePath;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Version and modification metadata for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Per-node mutation counter, starting at 1 on creation.
    pub version: u64,

    /// Store-wide revision of the last mutation to this node.
    ///
    /// Monotonic across the whole tree; the staleness guard compares this,
    /// never the per-node counter.
    pub mod_revision: u64,

    /// Last-modified wall-clock time in milliseconds since the epoch.
    pub mtime_ms: u64,
}

/// An immutable snapshot of a node's remote content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode {
    /// The node's path.
    pub path: TreePath,

    /// Opaque payload bytes. Schema mapping is the caller's concern.
    pub payload: Bytes,

    /// Version metadata for the payload.
    pub stat: Stat,
}

impl RawNode {
    /// Construct a shared node snapshot.
    pub fn new(path: TreePath, payload: Bytes, stat: Stat) -> Arc<Self> {
        Arc::new(Self {
            path,
            payload,
            stat,
        })
    }
}

/// A typed, materialized view of a node.
///
/// Produced by the client façade's codec at read time; the cache itself
/// only ever stores [`RawNode`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<T> {
    /// The node's path.
    pub path: TreePath,

    /// Decoded payload value.
    pub value: T,

    /// Version metadata for the payload.
    pub stat: Stat,
}
