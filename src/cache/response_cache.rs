//! Deduplicating response cache with TTL expiry and in-flight coalescing.
//!
//! Two maps under one lock: `entries` holds completed values for up to the
//! TTL, `pending` holds the shared future of a call that is still in flight.
//! At most one underlying call per key is ever outstanding — every caller
//! that arrives while a call is in flight joins it and observes exactly that
//! call's outcome. Failures fan out to all joiners and are never cached, so
//! the next call for the key starts fresh.
//!
//! Expiry is lazy plus one deferred eviction task per successful entry
//! (sleep TTL, then remove); there is no background sweep.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Result;

/// The shared handle every coalesced caller awaits.
type InFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Build a deterministic cache key from a call's identity and payload.
///
/// The payload is serialized with `serde_json`, so two calls share a key
/// only when their serialized payloads are byte-identical. Callers must
/// serialize payloads stably: a logically identical payload rendered in a
/// different field order fragments the cache into distinct entries. (For
/// `serde_json::Value` objects the serialization is key-sorted, which keeps
/// this stable; structs follow their declaration order.)
pub fn cache_key(method: &str, url: &str, payload: Option<&serde_json::Value>) -> String {
    match payload {
        Some(p) => format!("{method} {url}-{p}"),
        None => format!("{method} {url}"),
    }
}

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    /// Insertion stamp checked by the eviction task, so a timer belonging
    /// to an already-replaced entry never evicts its successor.
    stamp: u64,
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    pending: HashMap<String, InFlight<T>>,
    next_stamp: u64,
}

struct CacheInner<T> {
    ttl: Duration,
    state: Mutex<CacheState<T>>,
}

/// Deduplicating response cache. Cheap to clone; clones share one store.
///
/// A TTL of zero disables the cache entirely: the wrapper then only
/// coalesces calls that are in flight and never serves a completed result
/// twice.
pub struct ResponseCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for ResponseCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ResponseCache<T> {
    /// Create an empty cache whose entries live for `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    pending: HashMap::new(),
                    next_stamp: 0,
                }),
            }),
        }
    }

    /// Resolve `key` from the cache, an in-flight call, or by starting `op`.
    ///
    /// Lookup order:
    /// 1. a valid (non-expired) entry — returned without invoking anything;
    /// 2. an in-flight call for the key — joined, sharing its outcome;
    /// 3. otherwise `op` is invoked once and recorded as the in-flight call.
    ///
    /// `op` only constructs the future; it runs under the cache lock and
    /// must not block. The whole lookup-or-insert sequence holds the lock,
    /// so two concurrent callers can never both reach step 3.
    pub async fn get_or_start<F, Fut>(&self, key: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let in_flight = {
            let mut state = self.inner.state.lock().expect("cache state lock poisoned");
            let now = Instant::now();
            match state.entries.get(key) {
                Some(entry) if now.duration_since(entry.inserted_at) < self.inner.ttl => {
                    trace!(key, "cache hit");
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    // Expired but the eviction task has not fired yet.
                    debug!(key, "cache entry expired, removing");
                    state.entries.remove(key);
                }
                None => {}
            }
            if let Some(shared) = state.pending.get(key) {
                debug!(key, "joining in-flight call");
                shared.clone()
            } else {
                debug!(key, "cache miss, starting call");
                let fut = op();
                let inner = Arc::clone(&self.inner);
                let owned = key.to_string();
                let shared: InFlight<T> = async move {
                    let result = fut.await;
                    settle(&inner, &owned, &result);
                    result
                }
                .boxed()
                .shared();
                state.pending.insert(key.to_string(), shared.clone());
                shared
            }
        };
        in_flight.await
    }

    /// Number of completed entries currently cached.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("cache state lock poisoned")
            .entries
            .len()
    }

    /// `true` if no completed entries are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Record the outcome of a finished call.
///
/// Always clears the `pending` slot so a failed call never blocks retries.
/// On success (and a non-zero TTL) the value is cached and a one-shot
/// eviction task is scheduled for TTL from now.
fn settle<T: Clone + Send + Sync + 'static>(
    inner: &Arc<CacheInner<T>>,
    key: &str,
    result: &Result<T>,
) {
    let mut state = inner.state.lock().expect("cache state lock poisoned");
    state.pending.remove(key);
    let value = match result {
        Ok(v) => v.clone(),
        Err(e) => {
            debug!(key, error = %e, "call failed, nothing cached");
            return;
        }
    };
    if inner.ttl.is_zero() {
        // Dedupe-only mode: the result fans out to current joiners but is
        // never served again.
        return;
    }
    let stamp = state.next_stamp;
    state.next_stamp += 1;
    state.entries.insert(
        key.to_string(),
        CacheEntry {
            value,
            inserted_at: Instant::now(),
            stamp,
        },
    );
    drop(state);

    let inner = Arc::clone(inner);
    let owned = key.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(inner.ttl).await;
        let mut state = inner.state.lock().expect("cache state lock poisoned");
        if state.entries.get(&owned).is_some_and(|e| e.stamp == stamp) {
            state.entries.remove(&owned);
            debug!(key = %owned, "cache entry evicted after ttl");
        }
    });
}

impl<T> fmt::Debug for ResponseCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().expect("cache state lock poisoned");
        f.debug_struct("ResponseCache")
            .field("ttl", &self.inner.ttl)
            .field("entries", &state.entries.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
