//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use treecache::{
    CacheConfig, CacheListener, CachedClient, JsonCodec, MemoryStore, RawNode, RemoteStore,
    TreePath,
};

/// Install the log subscriber once per test binary.
///
/// Honors `RUST_LOG`; output is captured per test.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Parse a path literal.
pub fn path(raw: &str) -> TreePath {
    TreePath::parse(raw).expect("test path literal")
}

/// JSON-encode a string payload the way `JsonCodec` would.
pub fn json_bytes(value: &str) -> Bytes {
    Bytes::from(serde_json::to_vec(value).expect("json encode"))
}

/// Seed a store with string payloads.
pub async fn seed(store: &MemoryStore, entries: &[(&str, &str)]) {
    for (raw, value) in entries {
        store
            .write(&path(raw), json_bytes(value), None)
            .await
            .expect("seed write");
    }
}

/// Build a string-payload client over `store`, watching `root`.
pub fn string_client(store: Arc<MemoryStore>, root: &str) -> CachedClient<String> {
    init_tracing();
    CachedClient::new(
        store,
        path(root),
        Arc::new(JsonCodec),
        CacheConfig::default(),
    )
}

/// Poll `condition` until it holds or the timeout expires.
pub async fn wait_until(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A notification observed by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Added(String, u64),
    Updated(String, u64),
    Removed(String),
}

impl Observed {
    pub fn path(&self) -> &str {
        match self {
            Self::Added(p, _) | Self::Updated(p, _) | Self::Removed(p) => p,
        }
    }
}

/// Listener that records every notification it receives.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Observed>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<Observed> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Notification counts per path.
    pub fn counts_by_path(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for event in self.events.lock().iter() {
            *counts.entry(event.path().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

impl CacheListener for RecordingListener {
    fn node_added(&self, node: &Arc<RawNode>) {
        self.events
            .lock()
            .push(Observed::Added(node.path.to_string(), node.stat.version));
    }
    fn node_updated(&self, node: &Arc<RawNode>) {
        self.events
            .lock()
            .push(Observed::Updated(node.path.to_string(), node.stat.version));
    }
    fn node_removed(&self, path: &TreePath) {
        self.events.lock().push(Observed::Removed(path.to_string()));
    }
}
