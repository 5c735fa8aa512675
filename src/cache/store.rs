//! Cache Store Module
//!
//! The contract shared by every store backend.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheItem;
use crate::error::Result;

// == Cache Store ==
/// Load / set-with-TTL / evict, implemented by the memory and Redis backends.
///
/// Keys passed to `evict` that end in `*` are wildcard patterns: every stored
/// key containing the text before the `*` is removed. Any other key is
/// removed only on an exact match.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live item for `key`, or None when absent or expired.
    async fn load(&self, key: &str) -> Result<Option<CacheItem>>;

    /// Stores `item` under `key`. A `ttl` of None or zero uses the store default.
    async fn set(&self, key: &str, item: CacheItem, ttl: Option<Duration>) -> Result<()>;

    /// Removes every key named or matched by `keys`.
    async fn evict(&self, keys: &[String]) -> Result<()>;
}

/// Splits `key` into its wildcard fragment, if it is a pattern.
///
/// `"anson:hash*"` yields `Some("anson:hash")`; `"anson:hash"` yields None.
pub fn wildcard_fragment(key: &str) -> Option<&str> {
    key.strip_suffix('*')
}

/// Picks the TTL actually applied for a Set.
pub fn effective_ttl(ttl: Option<Duration>, default_ttl: Duration) -> Duration {
    match ttl {
        Some(ttl) if !ttl.is_zero() => ttl,
        _ => default_ttl,
    }
}
