//! In-process remote store backend.
//!
//! [`MemoryStore`] implements the full [`RemoteStore`] contract against an
//! owned map: versioned nodes, a store-wide revision counter, parent
//! existence checks, and watch fan-out. It exists for tests and for
//! embedding the cache against local state, and exposes two test controls:
//! a scriptable connection-state signal and transient read-failure
//! injection.
//!
//! Watch events are delivered only while the connection state is
//! [`ConnectionState::Connected`]; mutations made during an outage are
//! silently missed by subscribers, which is exactly the gap a resync sweep
//! has to repair.

use crate::core::error::{CacheError, CacheResult};
use crate::core::path::TreePath;
use crate::remote::{ConnectionState, RemoteStore, WatchEvent, WatchKind};
use crate::store::node::Stat;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Capacity of each watch subscriber's channel.
const WATCH_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Entry {
    payload: Bytes,
    stat: Stat,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<TreePath, Entry>,
    next_revision: u64,
    watchers: Vec<(TreePath, mpsc::Sender<WatchEvent>)>,
}

/// In-process [`RemoteStore`] implementation.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    conn_tx: watch::Sender<ConnectionState>,
    conn_rx: watch::Receiver<ConnectionState>,
    failing_reads: AtomicU32,
}

impl MemoryStore {
    /// Create an empty, connected store.
    pub fn new() -> Self {
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Connected);
        Self {
            inner: Mutex::new(Inner::default()),
            conn_tx,
            conn_rx,
            failing_reads: AtomicU32::new(0),
        }
    }

    /// Flip the connection-state signal.
    ///
    /// While the state is not `Connected`, watch events are dropped instead
    /// of delivered.
    pub fn set_connection_state(&self, state: ConnectionState) {
        let _ = self.conn_tx.send(state);
    }

    /// Make the next `count` reads fail with a transient error.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Number of nodes currently stored.
    pub fn node_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn broadcast(inner: &mut Inner, connected: bool, event: WatchEvent) {
        if !connected {
            debug!(path = %event.path, "dropping watch event during outage");
            return;
        }
        inner.watchers.retain(|(root, tx)| {
            if tx.is_closed() {
                return false;
            }
            if !event.path.starts_with(root) {
                return true;
            }
            // A full subscriber loses events from here on; it will need a
            // resync anyway, so drop it.
            tx.try_send(event.clone()).is_ok()
        });
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, path: &TreePath) -> CacheResult<(Bytes, Stat)> {
        if self.take_injected_failure() {
            return Err(CacheError::transient("injected read failure"));
        }
        let inner = self.inner.lock();
        let entry = inner
            .entries
            .get(path)
            .ok_or_else(|| CacheError::not_found(path))?;
        Ok((entry.payload.clone(), entry.stat))
    }

    async fn children(&self, path: &TreePath) -> CacheResult<Vec<String>> {
        let inner = self.inner.lock();
        let names = inner
            .entries
            .keys()
            .filter(|candidate| path.is_parent_of(candidate))
            .filter_map(|candidate| candidate.node_name().map(str::to_string))
            .collect();
        Ok(names)
    }

    async fn write(
        &self,
        path: &TreePath,
        payload: Bytes,
        expected_version: Option<u64>,
    ) -> CacheResult<Stat> {
        let connected = self.conn_rx.borrow().is_connected();
        let mut inner = self.inner.lock();

        if let Some(parent) = path.parent() {
            if !parent.is_root() && !inner.entries.contains_key(&parent) {
                return Err(CacheError::not_found(&parent));
            }
        }

        inner.next_revision += 1;
        let revision = inner.next_revision;

        let (stat, kind) = match inner.entries.get(path) {
            Some(existing) => {
                if let Some(expected) = expected_version {
                    if existing.stat.version != expected {
                        return Err(CacheError::VersionConflict {
                            path: path.clone(),
                            expected,
                            actual: existing.stat.version,
                        });
                    }
                }
                let stat = Stat {
                    version: existing.stat.version + 1,
                    mod_revision: revision,
                    mtime_ms: Self::now_ms(),
                };
                (
                    stat,
                    WatchKind::Updated {
                        payload: payload.clone(),
                        stat,
                    },
                )
            }
            None => {
                if let Some(expected) = expected_version {
                    return Err(CacheError::VersionConflict {
                        path: path.clone(),
                        expected,
                        actual: 0,
                    });
                }
                let stat = Stat {
                    version: 1,
                    mod_revision: revision,
                    mtime_ms: Self::now_ms(),
                };
                (
                    stat,
                    WatchKind::Created {
                        payload: payload.clone(),
                        stat,
                    },
                )
            }
        };

        inner.entries.insert(path.clone(), Entry { payload, stat });
        Self::broadcast(
            &mut inner,
            connected,
            WatchEvent {
                path: path.clone(),
                kind,
            },
        );
        Ok(stat)
    }

    async fn delete(&self, path: &TreePath, expected_version: Option<u64>) -> CacheResult<()> {
        let connected = self.conn_rx.borrow().is_connected();
        let mut inner = self.inner.lock();

        let existing = inner
            .entries
            .get(path)
            .ok_or_else(|| CacheError::not_found(path))?;
        if let Some(expected) = expected_version {
            if existing.stat.version != expected {
                return Err(CacheError::VersionConflict {
                    path: path.clone(),
                    expected,
                    actual: existing.stat.version,
                });
            }
        }

        inner.entries.remove(path);
        inner.next_revision += 1;
        Self::broadcast(
            &mut inner,
            connected,
            WatchEvent {
                path: path.clone(),
                kind: WatchKind::Deleted,
            },
        );
        Ok(())
    }

    async fn watch(&self, root: &TreePath) -> CacheResult<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        self.inner.lock().watchers.push((root.clone(), tx));
        Ok(rx)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.conn_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> TreePath {
        TreePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn write_creates_then_updates() {
        let store = MemoryStore::new();
        let p = path("/a");
        let created = store.write(&p, Bytes::from_static(b"1"), None).await.unwrap();
        assert_eq!(created.version, 1);

        let updated = store.write(&p, Bytes::from_static(b"2"), None).await.unwrap();
        assert_eq!(updated.version, 2);
        assert!(updated.mod_revision > created.mod_revision);

        let (payload, stat) = store.read(&p).await.unwrap();
        assert_eq!(&payload[..], b"2");
        assert_eq!(stat, updated);
    }

    #[tokio::test]
    async fn version_guard_enforced() {
        let store = MemoryStore::new();
        let p = path("/a");
        store.write(&p, Bytes::from_static(b"1"), None).await.unwrap();

        let err = store
            .write(&p, Bytes::from_static(b"2"), Some(7))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::VersionConflict { actual: 1, .. }));

        let err = store.delete(&p, Some(7)).await.unwrap_err();
        assert!(matches!(err, CacheError::VersionConflict { .. }));
        store.delete(&p, Some(1)).await.unwrap();
        assert!(store.read(&p).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn write_requires_parent() {
        let store = MemoryStore::new();
        let err = store
            .write(&path("/a/b"), Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Top-level nodes hang off the implicit root.
        store.write(&path("/a"), Bytes::from_static(b"x"), None).await.unwrap();
        store
            .write(&path("/a/b"), Bytes::from_static(b"y"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn children_lists_direct_names() {
        let store = MemoryStore::new();
        for raw in ["/a", "/a/x", "/a/y", "/a/x/deep", "/b"] {
            store.write(&path(raw), Bytes::from_static(b""), None).await.unwrap();
        }
        let mut names = store.children(&path("/a")).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["x", "y"]);
        assert!(store.children(&path("/missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watch_delivery_suppressed_during_outage() {
        let store = MemoryStore::new();
        store.write(&path("/a"), Bytes::from_static(b""), None).await.unwrap();
        let mut rx = store.watch(&path("/a")).await.unwrap();

        store.write(&path("/a/x"), Bytes::from_static(b"1"), None).await.unwrap();
        assert!(rx.recv().await.is_some());

        store.set_connection_state(ConnectionState::Disconnected);
        store.write(&path("/a/x"), Bytes::from_static(b"2"), None).await.unwrap();
        store.set_connection_state(ConnectionState::Connected);
        store.write(&path("/a/x"), Bytes::from_static(b"3"), None).await.unwrap();

        // The outage-era event is gone; the next delivered one is the
        // post-reconnect write.
        let event = rx.recv().await.unwrap();
        match event.kind {
            WatchKind::Updated { payload, .. } => assert_eq!(&payload[..], b"3"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_watchers_are_pruned_on_broadcast() {
        let store = MemoryStore::new();
        store.write(&path("/a"), Bytes::from_static(b""), None).await.unwrap();

        // A dead subscriber on a prefix no event ever matches must still
        // be pruned by unrelated traffic.
        let dead = store.watch(&path("/never")).await.unwrap();
        drop(dead);
        let live = store.watch(&path("/a")).await.unwrap();
        assert_eq!(store.inner.lock().watchers.len(), 2);

        store.write(&path("/a/x"), Bytes::from_static(b"1"), None).await.unwrap();
        assert_eq!(store.inner.lock().watchers.len(), 1);
        drop(live);
    }

    #[tokio::test]
    async fn injected_read_failures_are_transient() {
        let store = MemoryStore::new();
        let p = path("/a");
        store.write(&p, Bytes::from_static(b"1"), None).await.unwrap();

        store.fail_next_reads(2);
        assert!(store.read(&p).await.is_err());
        assert!(store.read(&p).await.is_err());
        assert!(store.read(&p).await.is_ok());
    }
}
