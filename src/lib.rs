//! Outbound request governor: rate limiting plus response deduplication.
//!
//! Every API call the host application makes to its backend passes through
//! two composed decorators:
//!
//! * [`RateLimiter`] — admits at most `limit` calls per fixed time window;
//!   excess callers suspend and are granted in FIFO order on rollover.
//! * [`ResponseCache`] — deduplicates concurrent identical calls (one
//!   underlying call in flight per key) and serves a TTL-bounded cached
//!   result for repeat calls.
//!
//! The cache is the **outer** layer: a cache hit or an in-flight join never
//! consumes rate-limiter capacity. Only calls that actually reach the
//! transport are throttled, because throttling exists to protect the backend
//! and cache-satisfied calls impose no backend load.
//!
//! # Example
//!
//! ```rust
//! use request_governor::{Governor, GovernorConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> request_governor::Result<()> {
//! let governor: Governor<String> = Governor::new(GovernorConfig::default())?;
//! let value = governor
//!     .execute("GET /api/v1/config/query?project_key=demo", || async {
//!         // the real transport call goes here
//!         Ok("response body".to_string())
//!     })
//!     .await?;
//! assert_eq!(value, "response body");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod governor;
pub mod limiter;
pub mod transport;

pub use cache::{cache_key, ResponseCache};
pub use config::GovernorConfig;
pub use error::{GovernorError, Result};
pub use governor::{GovernedClient, Governor};
pub use limiter::RateLimiter;
pub use transport::{HttpTransport, Transport};
