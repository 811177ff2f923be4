//! The cache engine.
//!
//! [`ModeledCache`] owns a [`PathStore`] mirror of one watched subtree and
//! applies [`ChangeEvent`]s to it from a single-writer apply loop. Any
//! number of readers may call [`current_data`](ModeledCache::current_data)
//! concurrently; they never block on I/O and never observe a half-applied
//! node, because entries are replaced as whole `Arc<RawNode>` values.
//!
//! Event application is idempotent and version-guarded: a duplicate or
//! reordered delivery whose `mod_revision` does not advance the cached
//! entry is discarded without listener churn. A `Resynced` baseline is
//! applied as a set difference, so listeners observe the net transition
//! rather than a bulk replace.

use crate::cache::listeners::{ListenerRegistry, Notification};
use crate::core::config::CacheConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::core::path::TreePath;
use crate::remote::RemoteStore;
use crate::store::node::RawNode;
use crate::store::path_store::{CacheSnapshot, PathStore};
use crate::stream::adapter::ChangeStream;
use crate::stream::events::ChangeEvent;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

enum Lifecycle {
    Idle,
    Starting,
    Running { task: JoinHandle<()> },
    Closed,
}

/// In-memory mirror of a watched subtree, kept consistent by a change
/// stream.
pub struct ModeledCache {
    root: TreePath,
    remote: Arc<dyn RemoteStore>,
    config: CacheConfig,
    store: RwLock<PathStore>,
    listeners: Arc<ListenerRegistry>,
    lifecycle: Mutex<Lifecycle>,
}

impl ModeledCache {
    /// Create an idle cache for the subtree rooted at `root`.
    pub fn new(remote: Arc<dyn RemoteStore>, root: TreePath, config: CacheConfig) -> Self {
        let listeners = Arc::new(ListenerRegistry::new(config.listeners.dispatch));
        Self {
            root,
            remote,
            config,
            store: RwLock::new(PathStore::new()),
            listeners,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// The watched subtree root.
    pub fn root(&self) -> &TreePath {
        &self.root
    }

    /// The listener registry for this cache.
    pub fn listenable(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Begin consuming the change stream.
    ///
    /// Resolves once the initial `Resynced` baseline has been applied, so
    /// reads immediately afterwards reflect a real subtree state. May be
    /// called at most once; a second call fails with
    /// [`CacheError::Closed`].
    pub async fn start(self: &Arc<Self>) -> CacheResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Idle => *lifecycle = Lifecycle::Starting,
                _ => return Err(CacheError::Closed),
            }
        }

        let stream = ChangeStream::open(
            Arc::clone(&self.remote),
            self.root.clone(),
            &self.config.stream,
            self.config.resync.clone(),
        );
        let (ready_tx, ready_rx) = oneshot::channel();
        let this = Arc::clone(self);
        let task = tokio::spawn(this.apply_loop(stream, ready_tx));

        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Starting => *lifecycle = Lifecycle::Running { task },
                // Closed raced in while we were spawning.
                _ => {
                    task.abort();
                    return Err(CacheError::Closed);
                }
            }
        }

        ready_rx.await.map_err(|_| CacheError::Closed)?;
        info!(root = %self.root, "cache baseline established");
        Ok(())
    }

    /// Stop consuming the stream, release the subscription, clear state.
    ///
    /// Idempotent.
    pub fn close(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
        };
        if let Lifecycle::Running { task } = previous {
            task.abort();
        }
        self.store.write().clear();
    }

    /// Whether the apply loop is running.
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }

    fn is_closed(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Closed)
    }

    /// The most recently applied snapshot for `path`.
    ///
    /// Non-blocking; never performs remote I/O.
    pub fn current_data(&self, path: &TreePath) -> Option<Arc<RawNode>> {
        self.store.read().get(path)
    }

    /// Paths of the direct children of `path` currently in the cache.
    pub fn current_children(&self, path: &TreePath) -> BTreeSet<TreePath> {
        self.store.read().children(path)
    }

    /// Point-in-time copy of the whole watched subtree.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.store.read().snapshot_under(&self.root)
    }

    async fn apply_loop(
        self: Arc<Self>,
        mut stream: ChangeStream,
        ready_tx: oneshot::Sender<()>,
    ) {
        let mut ready = Some(ready_tx);
        while let Some(event) = stream.next().await {
            let baseline = matches!(event, ChangeEvent::Resynced(_));
            self.apply_event(event);
            if baseline {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
            }
        }
        debug!(root = %self.root, "change stream ended");
    }

    /// Apply one event under the single-writer discipline.
    pub(crate) fn apply_event(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Resynced(snapshot) => self.apply_resync(snapshot),
            ChangeEvent::Created(node) | ChangeEvent::Updated(node) => self.apply_upsert(node),
            ChangeEvent::Deleted(path) => self.apply_delete(path),
        }
    }

    fn apply_upsert(&self, node: Arc<RawNode>) {
        let notification = {
            let mut store = self.store.write();
            // close() marks Closed before clearing under this lock, so an
            // event whose poll races the task abort is dropped here instead
            // of repopulating a cleared store.
            if self.is_closed() {
                return;
            }
            match store.get(&node.path) {
                Some(prior) if prior.stat.mod_revision >= node.stat.mod_revision => {
                    debug!(
                        path = %node.path,
                        cached = prior.stat.mod_revision,
                        incoming = node.stat.mod_revision,
                        "discarding stale or duplicate event"
                    );
                    None
                }
                Some(_) => {
                    store.put(Arc::clone(&node));
                    Some(Notification::Updated(node))
                }
                None => {
                    store.put(Arc::clone(&node));
                    Some(Notification::Added(node))
                }
            }
        };
        if let Some(notification) = notification {
            self.listeners.notify(notification);
        }
    }

    fn apply_delete(&self, path: TreePath) {
        let removed = {
            let mut store = self.store.write();
            if self.is_closed() {
                return;
            }
            store.remove(&path).is_some()
        };
        if removed {
            self.listeners.notify(Notification::Removed(path));
        }
    }

    fn apply_resync(&self, snapshot: CacheSnapshot) {
        let notifications = {
            let mut store = self.store.write();
            if self.is_closed() {
                return;
            }
            let previous = store.replace_under(&self.root, snapshot.clone());
            diff_transition(previous, &snapshot)
        };
        debug!(
            root = %self.root,
            transitions = notifications.len(),
            "resync baseline applied"
        );
        for notification in notifications {
            self.listeners.notify(notification);
        }
    }
}

impl Drop for ModeledCache {
    fn drop(&mut self) {
        if let Lifecycle::Running { task } = &*self.lifecycle.lock() {
            task.abort();
        }
    }
}

/// Net transition between two snapshots of the same subtree.
///
/// Unchanged paths (same `mod_revision`) produce nothing; a revision
/// regression across a resync boundary still counts as an update.
fn diff_transition(previous: CacheSnapshot, next: &CacheSnapshot) -> Vec<Notification> {
    let mut notifications = Vec::new();
    for (path, node) in next {
        match previous.get(path) {
            None => notifications.push(Notification::Added(Arc::clone(node))),
            Some(prior) if prior.stat.mod_revision != node.stat.mod_revision => {
                notifications.push(Notification::Updated(Arc::clone(node)));
            }
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !next.contains_key(path) {
            notifications.push(Notification::Removed(path.clone()));
        }
    }
    notifications
}
