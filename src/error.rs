//! Error types for the request governor.
//!
//! The error enum is `Clone` on purpose: a failed in-flight call is fanned
//! out through a shared future to every caller that joined it, and each
//! joiner receives its own copy of the failure.

use thiserror::Error;

/// Errors surfaced by the governor and its transport collaborator.
#[derive(Debug, Clone, Error)]
pub enum GovernorError {
    /// Rejected at construction time — a zero limit or window would
    /// silently deadlock every caller, so it must fail fast instead.
    #[error("invalid governor config: {0}")]
    InvalidConfig(String),

    /// The underlying transport call failed. Propagated unchanged to every
    /// caller sharing the in-flight result; never cached, never retried.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GovernorError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GovernorError>;
