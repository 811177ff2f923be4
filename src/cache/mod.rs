//! Cache engine and listener fan-out.
//!
//! - [`modeled`] - Single-writer cache engine
//! - [`listeners`] - Listener registration and fan-out

pub mod listeners;
pub mod modeled;

pub use listeners::{CacheListener, ListenerHandle, ListenerRegistry};
pub use modeled::ModeledCache;
