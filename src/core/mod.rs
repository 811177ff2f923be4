//! Core infrastructure.
//!
//! - [`path`] - Hierarchical path addressing
//! - [`error`] - Error types
//! - [`config`] - Configuration parsing and validation

pub mod config;
pub mod error;
pub mod path;
