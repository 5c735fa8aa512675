//! Route Cache - response caching for axum routes
//!
//! Wraps handlers with declarative cache and evict rules, backed by an
//! in-process TTL map or Redis.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheItem, CacheStore, MemoryStore, RedisStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use middleware::{CacheEngine, Cacheable, Caching, EvictRule, KeySpec, RequestParams};
pub use tasks::spawn_sweep_task;
