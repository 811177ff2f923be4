//! Typed client façade.
//!
//! - [`facade`] - Cache-backed client with pass-through writes
//! - [`codec`] - Payload schema mapping
//! - [`pending`] - Pending remote-operation results

pub mod codec;
pub mod facade;
pub mod pending;

pub use codec::{Codec, JsonCodec};
pub use facade::CachedClient;
pub use pending::Pending;
