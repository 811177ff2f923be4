//! Treecache - Watch-driven cache mirror for hierarchical versioned stores.
//!
//! Treecache keeps an in-memory, typed, path-addressed mirror of one
//! subtree of a ZooKeeper-like coordination service. Readers get
//! synchronous, low-latency access to the last-known tree state while
//! remote writers mutate it concurrently; a continuous change-notification
//! stream keeps the mirror current, and listeners observe every net state
//! transition.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       CachedClient<T>                           │
//! │     typed read │ read-through │ pass-through write/delete       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ModeledCache                             │
//! │    PathStore mirror │ single-writer apply │ listener fan-out    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ChangeStream                             │
//! │      resync sweeps │ event normalization │ retry/backoff        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     RemoteStore boundary                        │
//! │       read │ children │ write │ delete │ watch │ conn state     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::path`] - Hierarchical path addressing
//! - [`core::error`] - Error types
//! - [`core::config`] - Configuration parsing and validation
//!
//! ## Data model
//! - [`store::node`] - Node snapshots and version metadata
//! - [`store::path_store`] - In-memory path-addressed node store
//!
//! ## Remote boundary
//! - [`remote`] - Remote store trait and connection-state signal
//! - [`remote::memory`] - In-process backend for tests and embedding
//!
//! ## Synchronization
//! - [`stream::events`] - Normalized change events
//! - [`stream::adapter`] - Watch subscription and resync sweeps
//! - [`cache::modeled`] - Single-writer cache engine
//! - [`cache::listeners`] - Listener registration and fan-out
//!
//! ## Client
//! - [`client::facade`] - Typed cache-backed client
//! - [`client::codec`] - Payload schema mapping
//! - [`client::pending`] - Pending remote-operation results
//!
//! # Key Invariants
//!
//! - Exactly one logical writer (the apply loop) mutates cache state.
//! - Per path, cached `mod_revision` never regresses except across a
//!   resync baseline after session loss.
//! - Cache reads never perform remote I/O and never block on the writer
//!   beyond a map lookup.
//! - Listener notifications cover net state transitions only, in remote
//!   generation order per path.

// Core infrastructure
pub mod core;

// Data model
pub mod store;

// Remote store boundary
pub mod remote;

// Change-stream normalization
pub mod stream;

// Cache engine and listener fan-out
pub mod cache;

// Typed client façade
pub mod client;

// Re-exports for convenience
pub use crate::core::config::{CacheConfig, DispatchMode, ResyncConfig};
pub use crate::core::error::{CacheError, CacheResult};
pub use crate::core::path::TreePath;
pub use cache::{CacheListener, ListenerHandle, ListenerRegistry, ModeledCache};
pub use client::{CachedClient, Codec, JsonCodec, Pending};
pub use remote::{ConnectionState, MemoryStore, RemoteStore, WatchEvent, WatchKind};
pub use store::{CacheSnapshot, Node, PathStore, RawNode, Stat};
pub use stream::{ChangeEvent, ChangeStream};
