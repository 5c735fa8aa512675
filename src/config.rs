//! Configuration Module
//!
//! Handles loading and validating cache engine configuration from environment variables.

use std::env;

use crate::error::{CacheError, Result};

/// Default request body buffering limit, 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Which store backend the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process table with per-key expiry timers
    Memory,
    /// Networked Redis store
    Redis,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Backend::Memory),
            "redis" => Some(Backend::Redis),
            _ => None,
        }
    }
}

/// How much of a handler response is stored on a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Status code, headers and body; hits replay all three
    #[default]
    Full,
    /// Body only; hits are written as a 200 JSON response
    Body,
}

impl CaptureMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Some(CaptureMode::Full),
            "body" => Some(CaptureMode::Body),
            _ => None,
        }
    }
}

/// Cache engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store backend
    pub backend: Backend,
    /// Default TTL in seconds for entries stored without a per-rule TTL
    pub default_ttl: u64,
    /// Redis connection URL, required for the Redis backend
    pub redis_url: Option<String>,
    /// HTTP server port for the demo binary
    pub server_port: u16,
    /// Interval in seconds between sweeps of the in-memory store
    pub sweep_interval: u64,
    /// What gets stored for a cached response
    pub capture_mode: CaptureMode,
    /// Largest request body in bytes the engine buffers to read parameters
    pub body_limit: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `memory` or `redis` (default: memory)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `REDIS_URL` - Redis URL, e.g. `redis://127.0.0.1:6379` (no default)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Memory store sweep frequency in seconds (default: 30)
    /// - `CAPTURE_MODE` - `full` or `body` (default: full)
    /// - `BODY_LIMIT` - Request body buffering limit in bytes (default: 2 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: env::var("CACHE_BACKEND")
                .ok()
                .and_then(|v| Backend::parse(&v))
                .unwrap_or(defaults.backend),
            default_ttl: env::var("DEFAULT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            sweep_interval: env::var("SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval),
            capture_mode: env::var("CAPTURE_MODE")
                .ok()
                .and_then(|v| CaptureMode::parse(&v))
                .unwrap_or(defaults.capture_mode),
            body_limit: env::var("BODY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.body_limit),
        }
    }

    // == Validate ==
    /// Rejects configurations that cannot produce a working engine.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl == 0 {
            return Err(CacheError::Config(
                "DEFAULT_TTL must be greater than 0".to_string(),
            ));
        }
        if self.backend == Backend::Memory && self.sweep_interval == 0 {
            return Err(CacheError::Config(
                "SWEEP_INTERVAL must be greater than 0".to_string(),
            ));
        }
        if self.body_limit == 0 {
            return Err(CacheError::Config(
                "BODY_LIMIT must be greater than 0".to_string(),
            ));
        }
        if self.backend == Backend::Redis && self.redis_url.is_none() {
            return Err(CacheError::Config(
                "REDIS_URL is required when CACHE_BACKEND=redis".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            default_ttl: 300,
            redis_url: None,
            server_port: 3000,
            sweep_interval: 30,
            capture_mode: CaptureMode::Full,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}
