//! Change-stream normalization.
//!
//! [`ChangeStream`] turns the remote store's raw watch subscription and
//! connection-state signal into one ordered sequence of [`ChangeEvent`]s:
//!
//! - On open, it subscribes, performs a full recursive sweep of the watched
//!   subtree, and emits a single [`ChangeEvent::Resynced`] baseline before
//!   any incremental event.
//! - Between resyncs, raw notifications are forwarded 1:1.
//! - When the session drops and comes back, it re-subscribes, re-sweeps,
//!   and emits a fresh `Resynced`. Whatever was missed during the outage is
//!   repaired by that snapshot.
//!
//! A transient read failure during a sweep is retried with exponential
//! backoff up to the configured attempt bound, then escalated to
//! session-loss treatment: the sweep is abandoned and restarted once the
//! connection signal settles.

use crate::core::config::{ResyncConfig, StreamConfig};
use crate::core::error::{CacheError, CacheResult};
use crate::core::path::TreePath;
use crate::remote::{ConnectionState, RemoteStore, WatchEvent, WatchKind};
use crate::store::node::RawNode;
use crate::store::path_store::CacheSnapshot;
use crate::stream::events::ChangeEvent;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Normalized change-event stream for one watched subtree.
pub struct ChangeStream {
    rx: mpsc::Receiver<ChangeEvent>,
    task: JoinHandle<()>,
}

impl ChangeStream {
    /// Subscribe to `root` on `remote` and begin normalizing.
    ///
    /// The first event the stream yields is always `Resynced`; it is not
    /// emitted until a full sweep has succeeded, which may take as long as
    /// the remote stays unreachable.
    pub fn open(
        remote: Arc<dyn RemoteStore>,
        root: TreePath,
        stream: &StreamConfig,
        resync: ResyncConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(stream.channel_capacity);
        let task = tokio::spawn(run(remote, root, resync, tx));
        Self { rx, task }
    }

    /// Next normalized event, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    remote: Arc<dyn RemoteStore>,
    root: TreePath,
    resync: ResyncConfig,
    tx: mpsc::Sender<ChangeEvent>,
) {
    let mut conn_rx = remote.connection_state();

    let mut watch_rx = match establish(&*remote, &root, &resync, &mut conn_rx, &tx).await {
        Some(rx) => rx,
        None => return,
    };

    loop {
        tokio::select! {
            changed = conn_rx.changed() => {
                if changed.is_err() {
                    debug!(root = %root, "connection signal gone, ending stream");
                    return;
                }
                // The signal may collapse a Disconnected -> Connected
                // transition into a single wakeup, so any edge that ends
                // Connected has to be treated as a possible gap.
                let state = *conn_rx.borrow_and_update();
                if state.is_connected() {
                    info!(root = %root, "session re-established, resyncing");
                    watch_rx = match establish(&*remote, &root, &resync, &mut conn_rx, &tx).await {
                        Some(rx) => rx,
                        None => return,
                    };
                } else {
                    warn!(root = %root, state = ?state, "session lost, awaiting reconnect");
                }
            }
            event = watch_rx.recv() => {
                match event {
                    Some(raw) => {
                        if !forward(&root, raw, &tx).await {
                            return;
                        }
                    }
                    None => {
                        // Subscription dropped out from under us; treat it
                        // like a session loss.
                        warn!(root = %root, "watch subscription ended, resyncing");
                        watch_rx = match establish(&*remote, &root, &resync, &mut conn_rx, &tx).await {
                            Some(rx) => rx,
                            None => return,
                        };
                    }
                }
            }
        }
    }
}

/// Subscribe, sweep, and emit the `Resynced` baseline.
///
/// Loops until a sweep succeeds, parking on the connection signal after
/// each escalated failure. Returns `None` once the consumer is gone.
async fn establish(
    remote: &dyn RemoteStore,
    root: &TreePath,
    resync: &ResyncConfig,
    conn_rx: &mut watch::Receiver<ConnectionState>,
    tx: &mpsc::Sender<ChangeEvent>,
) -> Option<mpsc::Receiver<WatchEvent>> {
    loop {
        if !wait_for_connected(conn_rx).await {
            return None;
        }
        let watch_rx = match with_retry(resync, || remote.watch(root)).await {
            Ok(rx) => rx,
            Err(err) => {
                warn!(root = %root, %err, "watch subscription failed, retrying after reconnect");
                tokio::time::sleep(resync.backoff_for(resync.max_attempts)).await;
                continue;
            }
        };
        match sweep(remote, root, resync).await {
            Ok(snapshot) => {
                info!(root = %root, nodes = snapshot.len(), "resync sweep complete");
                if tx.send(ChangeEvent::Resynced(snapshot)).await.is_err() {
                    return None;
                }
                return Some(watch_rx);
            }
            Err(err) => {
                warn!(root = %root, %err, "resync sweep escalated, retrying after reconnect");
                tokio::time::sleep(resync.backoff_for(resync.max_attempts)).await;
            }
        }
    }
}

async fn wait_for_connected(conn_rx: &mut watch::Receiver<ConnectionState>) -> bool {
    loop {
        if conn_rx.borrow_and_update().is_connected() {
            return true;
        }
        if conn_rx.changed().await.is_err() {
            return false;
        }
    }
}

/// Full recursive read of the subtree at `root`.
///
/// A node that vanishes between listing and reading is skipped; it either
/// shows up as a later `Deleted` event or is simply absent from the
/// baseline. An absent root yields an empty snapshot.
async fn sweep(
    remote: &dyn RemoteStore,
    root: &TreePath,
    resync: &ResyncConfig,
) -> CacheResult<CacheSnapshot> {
    let mut snapshot = CacheSnapshot::new();
    let mut pending = vec![root.clone()];

    while let Some(path) = pending.pop() {
        match read_node(remote, &path, resync).await? {
            Some((payload, stat)) => {
                snapshot.insert(path.clone(), RawNode::new(path.clone(), payload, stat));
            }
            None => {
                debug!(path = %path, "node vanished during sweep, skipping");
                continue;
            }
        }
        let names = with_retry(resync, || remote.children(&path)).await?;
        for name in names {
            pending.push(path.child(&name)?);
        }
    }
    Ok(snapshot)
}

async fn read_node(
    remote: &dyn RemoteStore,
    path: &TreePath,
    resync: &ResyncConfig,
) -> CacheResult<Option<(Bytes, crate::store::node::Stat)>> {
    match with_retry(resync, || remote.read(path)).await {
        Ok(read) => Ok(Some(read)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Retry a remote operation on recoverable failures with bounded backoff.
///
/// Exhausting the attempt budget escalates to [`CacheError::SessionLoss`].
async fn with_retry<T, F, Fut>(resync: &ResyncConfig, mut op: F) -> CacheResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CacheResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() => {
                attempt += 1;
                if attempt >= resync.max_attempts {
                    warn!(%err, attempts = attempt, "retry budget exhausted");
                    return Err(CacheError::SessionLoss);
                }
                debug!(%err, attempt, "transient failure, backing off");
                tokio::time::sleep(resync.backoff_for(attempt - 1)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn forward(root: &TreePath, raw: WatchEvent, tx: &mpsc::Sender<ChangeEvent>) -> bool {
    if !raw.path.starts_with(root) {
        debug!(path = %raw.path, "ignoring event outside watched subtree");
        return true;
    }
    let event = match raw.kind {
        WatchKind::Created { payload, stat } => {
            ChangeEvent::Created(RawNode::new(raw.path, payload, stat))
        }
        WatchKind::Updated { payload, stat } => {
            ChangeEvent::Updated(RawNode::new(raw.path, payload, stat))
        }
        WatchKind::Deleted => ChangeEvent::Deleted(raw.path),
    };
    tx.send(event).await.is_ok()
}
