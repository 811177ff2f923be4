//! Synchronization engine tests: baselines, live updates, session loss.

mod common;

use common::{json_bytes, path, seed, string_client, wait_until, Observed, RecordingListener};
use std::sync::Arc;
use std::time::Duration;
use treecache::{
    CacheConfig, CachedClient, ConnectionState, DispatchMode, JsonCodec, MemoryStore, RemoteStore,
};

const SETTLE: Duration = Duration::from_secs(5);

// ============================================================================
// Baseline establishment
// ============================================================================

#[tokio::test]
async fn start_blocks_until_baseline_applied() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1"), ("/a/y", "2")]).await;

    let client = string_client(store, "/a");
    client.start().await.unwrap();

    // Immediately after start, reads reflect the swept subtree.
    assert_eq!(client.read_at(&path("/a/x")).unwrap().value, "1");
    assert_eq!(client.read_at(&path("/a/y")).unwrap().value, "2");
    assert_eq!(client.cache().snapshot().len(), 3);
    client.close();
}

#[tokio::test]
async fn start_on_empty_subtree_yields_empty_baseline() {
    let store = Arc::new(MemoryStore::new());
    let client = string_client(store, "/a");
    client.start().await.unwrap();
    assert!(client.cache().snapshot().is_empty());
    assert!(client.read_at(&path("/a/x")).unwrap_err().is_not_found());
    client.close();
}

#[tokio::test]
async fn transient_sweep_failures_are_retried() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1")]).await;
    store.fail_next_reads(2);

    let client = string_client(store, "/a");
    client.start().await.unwrap();
    assert_eq!(client.read_at(&path("/a/x")).unwrap().value, "1");
    client.close();
}

#[tokio::test]
async fn exhausted_retry_budget_escalates_and_recovers() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1")]).await;
    // Three injected failures against a budget of two: the first sweep
    // escalates, the next one retries through the last failure.
    store.fail_next_reads(3);

    let mut config = CacheConfig::default();
    config.resync.initial_backoff_ms = 1;
    config.resync.max_backoff_ms = 5;
    config.resync.max_attempts = 2;
    let client: CachedClient<String> =
        CachedClient::new(store, path("/a"), Arc::new(JsonCodec), config);

    client.start().await.unwrap();
    assert_eq!(client.read_at(&path("/a/x")).unwrap().value, "1");
    client.close();
}

// ============================================================================
// Live update propagation
// ============================================================================

#[tokio::test]
async fn remote_update_reaches_cache_and_listener_once() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1")]).await;

    let client = string_client(store.clone(), "/a");
    let listener = RecordingListener::new();
    client.listenable().add(listener.clone());
    client.start().await.unwrap();
    listener.take();

    let first = client.read_at(&path("/a/x")).unwrap();
    assert_eq!(first.value, "1");
    assert_eq!(first.stat.version, 1);

    // A remote actor updates the node.
    store
        .write(&path("/a/x"), json_bytes("2"), None)
        .await
        .unwrap();

    assert!(
        wait_until(
            || client
                .read_at(&path("/a/x"))
                .map(|n| n.value == "2")
                .unwrap_or(false),
            SETTLE
        )
        .await
    );
    let second = client.read_at(&path("/a/x")).unwrap();
    assert_eq!(second.stat.version, 2);
    assert_eq!(
        listener.take(),
        vec![Observed::Updated("/a/x".to_string(), 2)]
    );
    client.close();
}

#[tokio::test]
async fn remote_create_and_delete_notify_net_transitions() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root")]).await;

    let client = string_client(store.clone(), "/a");
    let listener = RecordingListener::new();
    client.listenable().add(listener.clone());
    client.start().await.unwrap();
    listener.take();

    store
        .write(&path("/a/n"), json_bytes("v"), None)
        .await
        .unwrap();
    store.delete(&path("/a/n"), None).await.unwrap();

    assert!(wait_until(|| listener.count() == 2, SETTLE).await);
    assert_eq!(
        listener.take(),
        vec![
            Observed::Added("/a/n".to_string(), 1),
            Observed::Removed("/a/n".to_string()),
        ]
    );
    assert!(client.read_at(&path("/a/n")).unwrap_err().is_not_found());
    client.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_dispatch_delivers_through_the_stack() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1")]).await;

    let mut config = CacheConfig::default();
    config.listeners.dispatch = DispatchMode::Spawned;
    let client: CachedClient<String> =
        CachedClient::new(store.clone(), path("/a"), Arc::new(JsonCodec), config);
    let listener = RecordingListener::new();
    client.listenable().add(listener.clone());
    client.start().await.unwrap();

    // Baseline notifications arrive on spawned tasks, after start resolves.
    assert!(wait_until(|| listener.count() == 2, SETTLE).await);
    listener.take();

    store
        .write(&path("/a/x"), json_bytes("2"), None)
        .await
        .unwrap();
    assert!(wait_until(|| listener.count() == 1, SETTLE).await);
    assert_eq!(
        listener.take(),
        vec![Observed::Updated("/a/x".to_string(), 2)]
    );
    client.close();
}

// ============================================================================
// Session loss and resync
// ============================================================================

#[tokio::test]
async fn outage_mutations_are_repaired_by_resync() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1"), ("/a/y", "keep")]).await;

    let client = string_client(store.clone(), "/a");
    let listener = RecordingListener::new();
    client.listenable().add(listener.clone());
    client.start().await.unwrap();
    listener.take();

    // Session drops; the cache keeps serving its last-known state.
    store.set_connection_state(ConnectionState::Disconnected);
    store
        .write(&path("/a/x"), json_bytes("2"), None)
        .await
        .unwrap();
    store
        .write(&path("/a/x"), json_bytes("3"), None)
        .await
        .unwrap();
    store.delete(&path("/a/y"), None).await.unwrap();

    assert_eq!(client.read_at(&path("/a/x")).unwrap().value, "1");
    assert_eq!(client.read_at(&path("/a/y")).unwrap().value, "keep");

    store.set_connection_state(ConnectionState::Connected);

    assert!(
        wait_until(
            || client.read_at(&path("/a/y")).is_err()
                && client
                    .read_at(&path("/a/x"))
                    .map(|n| n.value == "3")
                    .unwrap_or(false),
            SETTLE
        )
        .await
    );

    // Net transitions only: one update for /a/x despite two missed writes,
    // exactly one removal for /a/y, nothing for unchanged paths.
    let mut events = listener.take();
    events.sort_by_key(|e| e.path().to_string());
    assert_eq!(
        events,
        vec![
            Observed::Updated("/a/x".to_string(), 3),
            Observed::Removed("/a/y".to_string()),
        ]
    );
    client.close();
}

#[tokio::test]
async fn expired_session_resubscribes_and_resyncs() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("/a", "root"), ("/a/x", "1")]).await;

    let client = string_client(store.clone(), "/a");
    client.start().await.unwrap();

    store.set_connection_state(ConnectionState::Expired);
    store
        .write(&path("/a/x"), json_bytes("after"), None)
        .await
        .unwrap();
    store.set_connection_state(ConnectionState::Connected);

    assert!(
        wait_until(
            || client
                .read_at(&path("/a/x"))
                .map(|n| n.value == "after")
                .unwrap_or(false),
            SETTLE
        )
        .await
    );

    // The fresh subscription delivers live events again.
    store
        .write(&path("/a/x"), json_bytes("live"), None)
        .await
        .unwrap();
    assert!(
        wait_until(
            || client
                .read_at(&path("/a/x"))
                .map(|n| n.value == "live")
                .unwrap_or(false),
            SETTLE
        )
        .await
    );
    client.close();
}
