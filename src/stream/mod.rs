//! Change-stream normalization.
//!
//! - [`events`] - Normalized change events
//! - [`adapter`] - Watch subscription and resync sweep handling

pub mod adapter;
pub mod events;

pub use adapter::ChangeStream;
pub use events::ChangeEvent;
