//! Cache Module
//!
//! Cache items, the store contract and its in-memory and Redis backends.

mod item;
mod memory;
mod redis;
mod stats;
mod store;


// Re-export public types
pub use self::redis::{RedisStore, SCAN_BATCH};
pub use item::{current_timestamp_ms, ttl_millis, CacheItem};
pub use memory::MemoryStore;
pub use stats::{CacheStats, StatsRecorder};
pub use store::{effective_ttl, wildcard_fragment, CacheStore};
