//! Cache data model.
//!
//! - [`node`] - Node snapshots and version metadata
//! - [`path_store`] - In-memory path-addressed node store

pub mod node;
pub mod path_store;

pub use node::{Node, RawNode, Stat};
pub use path_store::{CacheSnapshot, PathStore};
