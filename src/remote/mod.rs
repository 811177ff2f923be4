//! Remote store boundary.
//!
//! The cache talks to the coordination service through [`RemoteStore`].
//! Transport, authentication, and reconnect policy live behind the trait;
//! the only connectivity surface exposed here is the
//! [`ConnectionState`] signal the change stream consumes to decide when a
//! resync is needed.
//!
//! - [`memory`] - In-process [`MemoryStore`] backend for tests and embedding

pub mod memory;

use crate::core::error::CacheResult;
use crate::core::path::TreePath;
use crate::store::node::Stat;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

pub use memory::MemoryStore;

/// Connectivity of the session to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session established; watch delivery is live.
    Connected,
    /// Connectivity lost; events generated now may be missed.
    Disconnected,
    /// The session expired; server-side watch state is gone.
    Expired,
}

impl ConnectionState {
    /// Whether watch delivery can be trusted in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// A raw change notification from the remote store's watch subscription.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Path of the mutated node.
    pub path: TreePath,
    /// What happened, with the node's new content where one exists.
    pub kind: WatchKind,
}

/// Kind of raw watch notification.
#[derive(Debug, Clone)]
pub enum WatchKind {
    /// The node came into existence.
    Created { payload: Bytes, stat: Stat },
    /// The node's content changed.
    Updated { payload: Bytes, stat: Stat },
    /// The node was removed.
    Deleted,
}

/// Access to a hierarchical, versioned remote store.
///
/// All operations address nodes by absolute [`TreePath`]. Writes and
/// deletes take an optional expected per-node version for optimistic
/// concurrency; `None` means unconditional.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Read a node's current payload and stat.
    ///
    /// Fails with [`CacheError::NotFound`](crate::CacheError::NotFound) if
    /// the path is absent.
    async fn read(&self, path: &TreePath) -> CacheResult<(Bytes, Stat)>;

    /// Names of the direct children of `path`.
    ///
    /// An absent path yields an empty listing.
    async fn children(&self, path: &TreePath) -> CacheResult<Vec<String>>;

    /// Create or update a node.
    ///
    /// With `expected_version: Some(v)` the node must exist at per-node
    /// version `v`; with `None` the write creates the node if absent. The
    /// parent must exist either way.
    async fn write(
        &self,
        path: &TreePath,
        payload: Bytes,
        expected_version: Option<u64>,
    ) -> CacheResult<Stat>;

    /// Delete a node, optionally guarded by its expected per-node version.
    async fn delete(&self, path: &TreePath, expected_version: Option<u64>) -> CacheResult<()>;

    /// Subscribe to change notifications for the subtree rooted at `root`.
    async fn watch(&self, root: &TreePath) -> CacheResult<mpsc::Receiver<WatchEvent>>;

    /// The out-of-band connection/session state signal.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}
