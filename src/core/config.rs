//! Configuration parsing and validation.
//!
//! Cache configuration is loaded from TOML with serde defaults, so an empty
//! document yields a usable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Change-event channel and apply-loop settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Retry policy for resync sweeps.
    #[serde(default)]
    pub resync: ResyncConfig,

    /// Listener dispatch settings.
    #[serde(default)]
    pub listeners: ListenerConfig,
}

/// Change-stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Bounded capacity of the normalized change-event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Retry policy for transient read failures during a resync sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncConfig {
    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Attempts per node read before escalating to session-loss handling.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ResyncConfig {
    /// Backoff for the given zero-based retry attempt, doubling up to the ceiling.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let raw = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(raw.min(self.max_backoff_ms))
    }
}

/// Listener dispatch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Where listener callbacks run.
    #[serde(default)]
    pub dispatch: DispatchMode,
}

/// Execution context for listener callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Run callbacks on the apply-loop writer. Preserves per-path ordering;
    /// a slow listener stalls event application.
    #[default]
    Inline,

    /// Spawn callbacks onto the runtime. The writer never stalls, but
    /// per-path ordering across in-flight notifications is not guaranteed.
    Spawned,
}

impl CacheConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CacheConfig =
            toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        if self.stream.channel_capacity == 0 {
            anyhow::bail!("stream.channel_capacity must be > 0");
        }
        if self.resync.max_attempts == 0 {
            anyhow::bail!("resync.max_attempts must be > 0");
        }
        if self.resync.initial_backoff_ms > self.resync.max_backoff_ms {
            anyhow::bail!(
                "resync.initial_backoff_ms ({}) exceeds resync.max_backoff_ms ({})",
                self.resync.initial_backoff_ms,
                self.resync.max_backoff_ms
            );
        }
        Ok(())
    }
}

// Default value functions

fn default_channel_capacity() -> usize {
    1024
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    5
}
