//! Governor configuration.
//!
//! One `GovernorConfig` describes a single guarded operation: how many
//! admissions per window the rate limiter grants, how long the window is,
//! and how long a successful response stays cached. The host application
//! embeds this in its own JSON config, so everything derives serde.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GovernorError, Result};

/// Default admissions per window (matches the backend's QPS allowance).
pub const DEFAULT_LIMIT: u32 = 9;

/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 1000;

/// Default cache TTL in milliseconds.
pub const DEFAULT_TTL_MS: u64 = 5000;

/// Configuration for one guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Maximum admissions per window. Must be positive.
    pub limit: u32,
    /// Fixed window length in milliseconds. Must be positive.
    pub window_ms: u64,
    /// Cache TTL in milliseconds. `0` disables caching entirely — the
    /// wrapper then only deduplicates calls that are in flight.
    pub ttl_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_ms: DEFAULT_WINDOW_MS,
            ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

impl GovernorConfig {
    /// Validate the configuration.
    ///
    /// A zero `limit` or `window_ms` would park every caller forever, so
    /// both are rejected here rather than discovered as a deadlock later.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(GovernorError::InvalidConfig(
                "limit must be positive".into(),
            ));
        }
        if self.window_ms == 0 {
            return Err(GovernorError::InvalidConfig(
                "window_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Cache TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}
