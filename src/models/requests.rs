//! Request DTOs for the demo server
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for `POST /ping`.
///
/// The `id` field drives the eviction rule; `hash` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct PingUpdate {
    /// User id whose cached pings are evicted
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
}

impl PingUpdate {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.id.trim().is_empty() {
            return Some("id cannot be empty".to_string());
        }
        None
    }
}
