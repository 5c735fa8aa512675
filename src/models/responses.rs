//! Response DTOs for the demo server
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for the ping routes.
#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub message: String,
    pub id: String,
    pub hash: String,
    /// When the handler produced this response; a cached replay keeps the
    /// original value
    pub generated_at: String,
}

impl PingResponse {
    pub fn new(id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            message: "pong".to_string(),
            id: id.into(),
            hash: hash.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub skipped: u64,
    /// Entries held by the in-memory store; None for Redis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_entries: Option<usize>,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, total_entries: Option<usize>) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            stores: stats.stores,
            evictions: stats.evictions,
            skipped: stats.skipped,
            total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
