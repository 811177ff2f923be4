//! Error types.
//!
//! Failures intrinsic to keeping the cache consistent (session loss,
//! transient reads during a resync sweep) are recovered internally and never
//! surface from cache reads. A cache reader only ever sees a value or
//! [`CacheError::NotFound`]. Direct remote operations (read-through misses,
//! writes, deletes) propagate the specific failure to the caller.

use crate::core::path::TreePath;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Common error conditions.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The path has no value, in the cache or in the remote store.
    ///
    /// Never retried by the core; absence is a valid answer.
    #[error("not found: {path}")]
    NotFound { path: TreePath },

    /// Optimistic-concurrency failure on write or delete.
    ///
    /// The caller decides whether to re-read and retry.
    #[error("version conflict at {path}: expected {expected}, actual {actual}")]
    VersionConflict {
        path: TreePath,
        expected: u64,
        actual: u64,
    },

    /// The remote session was lost.
    ///
    /// Absorbed by the change stream, which answers with a resync; only
    /// direct remote operations ever surface it.
    #[error("remote session lost")]
    SessionLoss,

    /// A transient remote I/O failure.
    ///
    /// Retried with bounded backoff during resync sweeps before escalating
    /// to session-loss treatment.
    #[error("transient i/o failure: {message}")]
    TransientIo { message: String },

    /// Payload (de)serialization failed in the delegated codec.
    #[error("codec failure: {message}")]
    Codec { message: String },

    /// Malformed path string or segment.
    #[error("invalid path: {message}")]
    InvalidPath { message: String },

    /// The cache is closed, or `start` was called twice.
    #[error("cache is not running")]
    Closed,
}

impl CacheError {
    /// Construct a [`CacheError::NotFound`] for `path`.
    pub fn not_found(path: &TreePath) -> Self {
        Self::NotFound { path: path.clone() }
    }

    /// Construct a [`CacheError::TransientIo`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo {
            message: message.into(),
        }
    }

    /// Construct a [`CacheError::Codec`].
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Whether this failure is recoverable by resyncing.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SessionLoss | Self::TransientIo { .. })
    }

    /// Whether this is an absence result rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
