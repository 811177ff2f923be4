//! Pending remote-operation results.
//!
//! A [`Pending`] is the handle for an in-flight remote operation. It is a
//! plain future with an explicit execution policy:
//!
//! - In the default mode the operation runs in place: continuations run
//!   wherever the caller awaits, and dropping the handle cancels the
//!   operation. Cancellation after the remote call has been issued is
//!   best-effort; the remote side effect may still occur.
//! - In detached mode (an `async_default` view) the operation is already
//!   spawned on the façade's runtime handle: continuations run there, and
//!   dropping the handle merely abandons the result while the operation
//!   completes regardless.

use crate::core::error::{CacheError, CacheResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

enum Inner<R> {
    Direct(Pin<Box<dyn Future<Output = CacheResult<R>> + Send>>),
    Detached(JoinHandle<CacheResult<R>>),
}

/// Handle to an in-flight remote operation.
pub struct Pending<R> {
    inner: Inner<R>,
}

impl<R> Pending<R> {
    pub(crate) fn direct(future: Pin<Box<dyn Future<Output = CacheResult<R>> + Send>>) -> Self {
        Self {
            inner: Inner::Direct(future),
        }
    }

    pub(crate) fn detached(handle: JoinHandle<CacheResult<R>>) -> Self {
        Self {
            inner: Inner::Detached(handle),
        }
    }

    /// Whether the underlying operation outlives this handle.
    pub fn is_detached(&self) -> bool {
        matches!(self.inner, Inner::Detached(_))
    }
}

impl<R> Future for Pending<R> {
    type Output = CacheResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Direct(future) => future.as_mut().poll(cx),
            Inner::Detached(handle) => Pin::new(handle).poll(cx).map(|joined| {
                joined.unwrap_or_else(|err| {
                    Err(CacheError::transient(format!("detached task failed: {err}")))
                })
            }),
        }
    }
}
