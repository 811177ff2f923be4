//! The typed client façade.
//!
//! [`CachedClient`] composes a [`ModeledCache`] with a direct remote-store
//! delegate. Reads are served from the cache; writes and deletes pass
//! straight through to the remote store and are observed by the cache only
//! when the corresponding change event arrives, keeping the change stream
//! the single source of truth for cache state.
//!
//! `child`/`with_path` derive cheap views scoped to another path: they
//! share the cache, the delegate, and the listener registry, and open no
//! new watch.

use crate::cache::listeners::ListenerRegistry;
use crate::cache::modeled::ModeledCache;
use crate::client::codec::Codec;
use crate::client::pending::Pending;
use crate::core::config::CacheConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::core::path::TreePath;
use crate::remote::RemoteStore;
use crate::store::node::{Node, RawNode, Stat};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Typed, cache-backed client for one watched subtree.
///
/// Cloning (and the `child`/`with_path`/`async_default` views) is cheap:
/// all state is shared, only the scope path and completion policy differ.
pub struct CachedClient<T> {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<ModeledCache>,
    codec: Arc<dyn Codec<T>>,
    path: TreePath,
    handle: Handle,
    detached: bool,
}

impl<T> Clone for CachedClient<T> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            cache: Arc::clone(&self.cache),
            codec: Arc::clone(&self.codec),
            path: self.path.clone(),
            handle: self.handle.clone(),
            detached: self.detached,
        }
    }
}

impl<T: Send + Sync + 'static> CachedClient<T> {
    /// Create a client caching the subtree rooted at `root`.
    ///
    /// Must be called within a tokio runtime; the current runtime handle
    /// becomes the façade's execution context for detached completions.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        root: TreePath,
        codec: Arc<dyn Codec<T>>,
        config: CacheConfig,
    ) -> Self {
        let cache = Arc::new(ModeledCache::new(
            Arc::clone(&remote),
            root.clone(),
            config,
        ));
        Self {
            remote,
            cache,
            codec,
            path: root,
            handle: Handle::current(),
            detached: false,
        }
    }

    /// The underlying cache, for direct inspection.
    pub fn cache(&self) -> &Arc<ModeledCache> {
        &self.cache
    }

    /// The listener registry of the underlying cache.
    pub fn listenable(&self) -> &Arc<ListenerRegistry> {
        self.cache.listenable()
    }

    /// This view's scope path.
    pub fn path(&self) -> &TreePath {
        &self.path
    }

    /// Start the internally created cache.
    ///
    /// Resolves once the initial baseline is applied.
    pub async fn start(&self) -> CacheResult<()> {
        self.cache.start().await
    }

    /// Stop the cache and clear its state. Idempotent.
    pub fn close(&self) {
        self.cache.close();
    }

    /// View scoped to the direct child `name`.
    pub fn child(&self, name: &str) -> CacheResult<Self> {
        Ok(self.with_path(self.path.child(name)?))
    }

    /// View scoped to `path`, sharing this client's cache and delegate.
    pub fn with_path(&self, path: TreePath) -> Self {
        let mut view = self.clone();
        view.path = path;
        view
    }

    /// View whose pending results complete on this façade's runtime
    /// handle instead of the caller's await context.
    pub fn async_default(&self) -> Self {
        let mut view = self.clone();
        view.detached = true;
        view
    }

    /// Read this view's node from the cache.
    ///
    /// Never performs remote I/O; fails with
    /// [`CacheError::NotFound`] when the cache holds no entry.
    pub fn read(&self) -> CacheResult<Node<T>> {
        self.read_at(&self.path)
    }

    /// Read `path` from the cache.
    pub fn read_at(&self, path: &TreePath) -> CacheResult<Node<T>> {
        let raw = self
            .cache
            .current_data(path)
            .ok_or_else(|| CacheError::not_found(path))?;
        self.materialize(&raw)
    }

    /// Read this view's node, falling back to a direct remote read on a
    /// cache miss.
    pub fn read_through(&self) -> Pending<Node<T>> {
        self.read_through_at(&self.path)
    }

    /// Read `path`, falling back to a direct remote read on a cache miss.
    ///
    /// The fetched value is returned one-off and never inserted into the
    /// cache; the change stream remains the cache's only writer.
    pub fn read_through_at(&self, path: &TreePath) -> Pending<Node<T>> {
        if let Some(raw) = self.cache.current_data(path) {
            let materialized = self.materialize(&raw);
            return self.complete(async move { materialized });
        }
        let remote = Arc::clone(&self.remote);
        let codec = Arc::clone(&self.codec);
        let path = path.clone();
        self.complete(async move {
            let (payload, stat) = remote.read(&path).await?;
            let value = codec.decode(&payload)?;
            Ok(Node { path, value, stat })
        })
    }

    /// Write a value at this view's path.
    pub fn write(&self, value: &T, expected_version: Option<u64>) -> Pending<Stat> {
        self.write_at(&self.path, value, expected_version)
    }

    /// Write a value at `path`, passing straight through to the remote
    /// store.
    ///
    /// Completion means the remote store acknowledged the write; the cache
    /// observes it only once the corresponding change event arrives.
    pub fn write_at(
        &self,
        path: &TreePath,
        value: &T,
        expected_version: Option<u64>,
    ) -> Pending<Stat> {
        let encoded = self.codec.encode(value);
        let remote = Arc::clone(&self.remote);
        let path = path.clone();
        self.complete(async move {
            let payload = encoded?;
            remote.write(&path, payload, expected_version).await
        })
    }

    /// Delete this view's node.
    pub fn delete(&self, expected_version: Option<u64>) -> Pending<()> {
        self.delete_at(&self.path, expected_version)
    }

    /// Delete `path`, passing straight through to the remote store.
    pub fn delete_at(&self, path: &TreePath, expected_version: Option<u64>) -> Pending<()> {
        let remote = Arc::clone(&self.remote);
        let path = path.clone();
        self.complete(async move { remote.delete(&path, expected_version).await })
    }

    fn materialize(&self, raw: &Arc<RawNode>) -> CacheResult<Node<T>> {
        let value = self.codec.decode(&raw.payload)?;
        Ok(Node {
            path: raw.path.clone(),
            value,
            stat: raw.stat,
        })
    }

    fn complete<R, F>(&self, future: F) -> Pending<R>
    where
        R: Send + 'static,
        F: Future<Output = CacheResult<R>> + Send + 'static,
    {
        if self.detached {
            Pending::detached(self.handle.spawn(future))
        } else {
            Pending::direct(Box::pin(future))
        }
    }
}
