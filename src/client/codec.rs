//! Payload schema mapping.
//!
//! The cache stores opaque bytes; turning them into domain values is the
//! job of a [`Codec`] supplied by the caller. [`JsonCodec`] covers the
//! common serde case.

use crate::core::error::{CacheError, CacheResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maps domain values to and from opaque payload bytes.
pub trait Codec<T>: Send + Sync + 'static {
    /// Encode a value for a remote write.
    fn encode(&self, value: &T) -> CacheResult<Bytes>;

    /// Decode a payload read from the cache or the remote store.
    fn decode(&self, payload: &Bytes) -> CacheResult<T>;
}

/// JSON codec for serde-capable types.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, value: &T) -> CacheResult<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|err| CacheError::codec(err.to_string()))
    }

    fn decode(&self, payload: &Bytes) -> CacheResult<T> {
        serde_json::from_slice(payload).map_err(|err| CacheError::codec(err.to_string()))
    }
}
