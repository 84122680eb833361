//! Response deduplication: TTL caching plus in-flight request coalescing.

pub mod response_cache;

pub use response_cache::{cache_key, ResponseCache};
