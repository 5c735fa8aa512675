//! Redis Store Module
//!
//! Delegates storage and expiry to a Redis server. Items travel as JSON.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::store::{effective_ttl, wildcard_fragment};
use crate::cache::{ttl_millis, CacheItem, CacheStore};
use crate::error::{CacheError, Result};

/// COUNT hint for the single SCAN pass used by wildcard eviction.
pub const SCAN_BATCH: usize = 65_535;

/// Longest expiry sent with PSETEX (100 years). Redis rejects expiry times
/// that overflow its millisecond clock.
pub const MAX_TTL_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

// == Redis Store ==
/// Networked store backend.
///
/// Wildcard eviction runs one SCAN pass. With very large keyspaces that pass
/// may not visit every match, so a wildcard evict is best-effort and is not
/// retried.
///
/// A connection that fails with an IO error is dropped; the next operation
/// opens a fresh one.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    default_ttl: Duration,
}

impl RedisStore {
    // == Constructor ==
    /// Creates a store for `url`. No connection is made until first use.
    ///
    /// Fails when the URL is malformed or `default_ttl` is zero.
    pub fn new(url: &str, default_ttl: Duration) -> Result<Self> {
        if default_ttl.is_zero() {
            return Err(CacheError::Config(
                "default TTL must be greater than 0".to_string(),
            ));
        }

        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Config(format!("invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            default_ttl,
        })
    }

    /// Shared multiplexed connection, opened on first use or after a drop.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_tokio_connection().await?;
        debug!("Opened Redis connection");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Converts a command result, forgetting the connection if it broke.
    async fn checked<T>(&self, result: RedisResult<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if is_broken_connection(&e) {
                    warn!(error = %e, "Redis connection lost, reconnecting on next use");
                    self.connection.lock().await.take();
                }
                Err(e.into())
            }
        }
    }

    /// Keys matching `fragment` anywhere, from one SCAN pass.
    async fn scan_matches(
        &self,
        conn: &mut MultiplexedConnection,
        fragment: &str,
    ) -> Result<Vec<String>> {
        let result: RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
            .arg(0u64)
            .arg("MATCH")
            .arg(substring_pattern(fragment))
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await;
        let (_cursor, keys) = self.checked(result).await?;
        Ok(keys)
    }
}

fn is_broken_connection(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped()
}

/// Builds a glob that matches keys containing `fragment`.
///
/// Glob metacharacters in the fragment are escaped so they match literally.
pub fn substring_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('*');
    for ch in fragment.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}

/// Decodes a stored payload. Undecodable payloads are reported as None.
pub fn decode_item(key: &str, raw: &str) -> Option<CacheItem> {
    match serde_json::from_str(raw) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(key = key, error = %e, "Discarding undecodable Redis cache payload");
            None
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn load(&self, key: &str) -> Result<Option<CacheItem>> {
        let mut conn = self.connection().await?;

        let raw: Option<String> = self.checked(conn.get(key).await).await?;

        match raw {
            Some(raw) => {
                let item = decode_item(key, &raw);
                debug!(key = key, hit = item.is_some(), "Redis cache load");
                Ok(item)
            }
            None => {
                debug!(key = key, "Redis cache miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, item: CacheItem, ttl: Option<Duration>) -> Result<()> {
        let ttl = effective_ttl(ttl, self.default_ttl);
        let payload = serde_json::to_string(&item)?;

        let mut conn = self.connection().await?;
        // PSETEX rejects 0, so sub-millisecond TTLs round up.
        let millis = ttl_millis(ttl).clamp(1, MAX_TTL_MS);
        let result: RedisResult<()> = conn.pset_ex(key, payload, millis).await;
        self.checked(result).await?;

        debug!(key = key, ttl_ms = millis, "Redis cache set");
        Ok(())
    }

    async fn evict(&self, keys: &[String]) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut doomed: Vec<String> = Vec::new();
        for key in keys {
            match wildcard_fragment(key) {
                Some(fragment) => match self.scan_matches(&mut conn, fragment).await {
                    Ok(found) => doomed.extend(found),
                    Err(e) => warn!(pattern = %key, error = %e, "Redis SCAN failed"),
                },
                None if !key.is_empty() => doomed.push(key.clone()),
                None => {}
            }
        }

        if doomed.is_empty() {
            return Ok(());
        }

        let removed: u64 = self.checked(conn.del(&doomed).await).await?;
        debug!(patterns = ?keys, removed = removed, "Redis cache evict");
        Ok(())
    }
}
