//! Listener registration and fan-out.
//!
//! [`ListenerRegistry`] is an observer registry with explicit removal
//! tokens. Notifications are produced by the cache's single writer and
//! delivered either inline on the writer or spawned onto the runtime,
//! per [`DispatchMode`]. A panicking listener is caught and reported; it
//! never disturbs other listeners or the application of later events.

use crate::core::config::DispatchMode;
use crate::core::path::TreePath;
use crate::store::node::RawNode;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Receives cache state transitions.
///
/// Callbacks default to no-ops so implementors can pick the ones they care
/// about. For a given path, callbacks arrive in the order the remote store
/// generated the underlying mutations (inline dispatch only).
pub trait CacheListener: Send + Sync + 'static {
    /// A node appeared in the cache.
    fn node_added(&self, _node: &Arc<RawNode>) {}

    /// A cached node's content changed.
    fn node_updated(&self, _node: &Arc<RawNode>) {}

    /// A node left the cache.
    fn node_removed(&self, _path: &TreePath) {}
}

/// Opaque removal token returned by [`ListenerRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// A net cache state transition, ready for fan-out.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    Added(Arc<RawNode>),
    Updated(Arc<RawNode>),
    Removed(TreePath),
}

/// Registry of cache listeners.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<u64, Arc<dyn CacheListener>>>,
    dispatch: DispatchMode,
}

impl ListenerRegistry {
    /// Create an empty registry with the given dispatch mode.
    pub fn new(dispatch: DispatchMode) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(BTreeMap::new()),
            dispatch,
        }
    }

    /// Register a listener, returning its removal token.
    pub fn add(&self, listener: Arc<dyn CacheListener>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, listener);
        ListenerHandle(id)
    }

    /// Deregister a listener. Returns false if the token was already spent.
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        self.listeners.write().remove(&handle.0).is_some()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Fan a notification out to the currently registered listeners.
    pub(crate) fn notify(&self, notification: Notification) {
        let targets: Vec<Arc<dyn CacheListener>> =
            self.listeners.read().values().cloned().collect();
        if targets.is_empty() {
            return;
        }
        match self.dispatch {
            DispatchMode::Inline => deliver(&targets, &notification),
            DispatchMode::Spawned => {
                tokio::spawn(async move {
                    deliver(&targets, &notification);
                });
            }
        }
    }
}

fn deliver(targets: &[Arc<dyn CacheListener>], notification: &Notification) {
    for listener in targets {
        let outcome = catch_unwind(AssertUnwindSafe(|| match notification {
            Notification::Added(node) => listener.node_added(node),
            Notification::Updated(node) => listener.node_updated(node),
            Notification::Removed(path) => listener.node_removed(path),
        }));
        if let Err(panic) = outcome {
            warn!(
                panic = panic_message(&panic),
                "listener panicked during notification"
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::node::Stat;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        added: AtomicUsize,
        removed: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                added: AtomicUsize::new(0),
                removed: AtomicUsize::new(0),
            })
        }
    }

    impl CacheListener for Counting {
        fn node_added(&self, _node: &Arc<RawNode>) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn node_removed(&self, _path: &TreePath) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl CacheListener for Panicking {
        fn node_added(&self, _node: &Arc<RawNode>) {
            panic!("listener bug");
        }
    }

    fn added_notification() -> Notification {
        Notification::Added(RawNode::new(
            TreePath::parse("/a").unwrap(),
            Bytes::from_static(b"x"),
            Stat {
                version: 1,
                mod_revision: 1,
                mtime_ms: 0,
            },
        ))
    }

    #[test]
    fn add_notify_remove() {
        let registry = ListenerRegistry::new(DispatchMode::Inline);
        let counting = Counting::new();
        let handle = registry.add(counting.clone());
        assert_eq!(registry.len(), 1);

        registry.notify(added_notification());
        assert_eq!(counting.added.load(Ordering::SeqCst), 1);

        assert!(registry.remove(handle));
        assert!(!registry.remove(handle));
        registry.notify(added_notification());
        assert_eq!(counting.added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new(DispatchMode::Inline);
        let first = Counting::new();
        registry.add(Arc::new(Panicking));
        registry.add(first.clone());

        registry.notify(added_notification());
        registry.notify(Notification::Removed(TreePath::parse("/a").unwrap()));
        assert_eq!(first.added.load(Ordering::SeqCst), 1);
        assert_eq!(first.removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawned_dispatch_delivers_and_isolates_panics() {
        let registry = ListenerRegistry::new(DispatchMode::Spawned);
        let counting = Counting::new();
        registry.add(Arc::new(Panicking));
        registry.add(counting.clone());

        registry.notify(added_notification());
        registry.notify(Notification::Removed(TreePath::parse("/a").unwrap()));

        // Delivery happens on spawned tasks; poll until both land.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while (counting.added.load(Ordering::SeqCst), counting.removed.load(Ordering::SeqCst))
            != (1, 1)
        {
            assert!(tokio::time::Instant::now() < deadline, "spawned delivery never arrived");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}
