//! Response Capture
//!
//! Snapshots what a handler produced so it can be stored, while the client
//! still receives the identical response.

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use tracing::debug;

use crate::cache::CacheItem;
use crate::config::CaptureMode;
use crate::error::{CacheError, Result};

/// Headers describing body framing; the replayed body recomputes them.
const SKIPPED_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// A forwarded response and the item captured from it.
pub struct CapturedResponse {
    pub response: Response,
    pub item: CacheItem,
}

/// Buffers `response`'s body and returns it alongside a cache snapshot.
///
/// The snapshot is taken after the handler returned, so it sees the final
/// status and headers. The forwarded response keeps those parts unchanged.
pub async fn capture(response: Response, mode: CaptureMode) -> Result<CapturedResponse> {
    let (parts, body) = response.into_parts();

    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| CacheError::Body(e.to_string()))?;

    let item = match mode {
        CaptureMode::Full => CacheItem::new(
            parts.status.as_u16(),
            snapshot_headers(&parts.headers),
            bytes.to_vec(),
        ),
        CaptureMode::Body => CacheItem::text(bytes.to_vec()),
    };

    Ok(CapturedResponse {
        response: Response::from_parts(parts, Body::from(bytes)),
        item,
    })
}

/// Header pairs worth replaying, in the order they were set.
pub fn snapshot_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !SKIPPED_HEADERS.contains(name))
        .filter_map(|(name, value)| match value.to_str() {
            Ok(value) => Some((name.as_str().to_string(), value.to_string())),
            Err(_) => {
                debug!(header = %name, "Skipping non-text header in capture");
                None
            }
        })
        .collect()
}
