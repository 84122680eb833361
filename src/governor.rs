//! Composition of the rate limiter and response cache.
//!
//! The cache wraps the limiter, not the other way around: a cache hit or an
//! in-flight join never consumes admission capacity, and `acquire()` runs
//! inside the shared in-flight future so a whole coalesced group costs
//! exactly one admission. Throttling protects the backend; calls satisfied
//! from the cache impose no backend load and are not throttled.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{cache_key, ResponseCache};
use crate::config::GovernorConfig;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::transport::Transport;

/// One guarded operation: a rate limiter and a response cache around any
/// asynchronous call. Explicitly constructed and owned — nothing here is
/// ambient global state, so tests get fresh quota and cache per instance.
#[derive(Debug, Clone)]
pub struct Governor<T> {
    limiter: RateLimiter,
    cache: ResponseCache<T>,
}

impl<T: Clone + Send + Sync + 'static> Governor<T> {
    /// Build a governor from a validated config. Fails fast on a zero
    /// limit or window.
    pub fn new(config: GovernorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            limiter: RateLimiter::new(config.limit, config.window())?,
            cache: ResponseCache::new(config.ttl()),
        })
    }

    /// Run `op` under the governor.
    ///
    /// A valid cached entry for `key` is returned without invoking `op` or
    /// touching the limiter. Joining an in-flight call likewise costs
    /// nothing. Only when a fresh underlying call starts does the caller
    /// group wait for one admission slot before `op`'s future runs.
    pub async fn execute<F, Fut>(&self, key: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let limiter = self.limiter.clone();
        self.cache
            .get_or_start(key, move || async move {
                limiter.acquire().await;
                op().await
            })
            .await
    }
}

/// A [`Transport`] guarded per verb, the way the host app wires it: GET and
/// POST each get their own governor (and therefore their own quota and
/// cache), since the backend accounts their rates separately.
pub struct GovernedClient {
    transport: Arc<dyn Transport>,
    get_governor: Governor<Value>,
    post_governor: Governor<Value>,
}

impl GovernedClient {
    /// Wrap `transport` with one governor per verb, both built from the
    /// same config.
    pub fn new(transport: Arc<dyn Transport>, config: GovernorConfig) -> Result<Self> {
        Ok(Self {
            get_governor: Governor::new(config.clone())?,
            post_governor: Governor::new(config)?,
            transport,
        })
    }

    /// Governed GET. Identical URLs within the TTL share one response.
    pub async fn get(&self, url: &str) -> Result<Value> {
        let key = cache_key("GET", url, None);
        let transport = Arc::clone(&self.transport);
        let url = url.to_string();
        self.get_governor
            .execute(&key, move || async move { transport.get(&url).await })
            .await
    }

    /// Governed POST. The key covers the payload, so only byte-identical
    /// payloads to the same URL are deduplicated.
    pub async fn post(&self, url: &str, payload: Value) -> Result<Value> {
        let key = cache_key("POST", url, Some(&payload));
        let transport = Arc::clone(&self.transport);
        let url = url.to_string();
        self.post_governor
            .execute(&key, move || async move {
                transport.post(&url, &payload).await
            })
            .await
    }
}

impl std::fmt::Debug for GovernedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernedClient")
            .field("get", &self.get_governor)
            .field("post", &self.post_governor)
            .finish()
    }
}
