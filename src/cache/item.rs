//! Cache Item Module
//!
//! Defines the stored unit: a captured response plus timing metadata.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Cache Item ==
/// A stored response: status, ordered headers and raw body bytes.
///
/// The in-memory store stamps `expires_at`; the Redis store leaves it unset
/// and relies on the server-side expiry instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// HTTP status code of the captured response
    pub status: u16,
    /// Response headers in the order the handler produced them
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Response body bytes
    pub body: Vec<u8>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = managed elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl CacheItem {
    // == Constructors ==
    /// Creates a full-fidelity item from a captured response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            created_at: current_timestamp_ms(),
            expires_at: None,
        }
    }

    /// Creates a bare payload item: status 200 and no headers.
    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, Vec::new(), body)
    }

    /// Returns a copy that expires `ttl` from now.
    ///
    /// TTLs too large to represent saturate at `u64::MAX`, i.e. never expire.
    pub fn expiring_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(current_timestamp_ms().saturating_add(ttl_millis(ttl)));
        self
    }

    // == Accessors ==
    /// Body as UTF-8 text, lossy.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// First header value for `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when the item carries no payload worth serving.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.headers.is_empty()
    }

    // == Expiry ==
    /// An item is expired once the current time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Remaining TTL in milliseconds, `Some(0)` once expired, None when unmanaged.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// `ttl` in whole milliseconds, saturating at `u64::MAX`.
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
