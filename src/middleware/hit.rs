//! Hit Callback Chain
//!
//! Decides who writes the response when a lookup hits: the matched rule's
//! callback, else the engine's callback, else the built-in writer.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use tracing::debug;

use super::rules::HitCallback;
use crate::cache::CacheItem;

/// Content type used when a stored item carries no headers of its own.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// The layer that answers a hit.
pub enum HitHandler<'a> {
    Rule(&'a HitCallback),
    Engine(&'a HitCallback),
    Default,
}

impl<'a> HitHandler<'a> {
    /// First present layer wins.
    pub fn select(rule: Option<&'a HitCallback>, engine: Option<&'a HitCallback>) -> Self {
        match (rule, engine) {
            (Some(callback), _) => HitHandler::Rule(callback),
            (None, Some(callback)) => HitHandler::Engine(callback),
            (None, None) => HitHandler::Default,
        }
    }

    /// Produces the final response; nothing downstream runs after this.
    pub fn respond(&self, item: &CacheItem) -> Response {
        match self {
            HitHandler::Rule(callback) | HitHandler::Engine(callback) => callback(item),
            HitHandler::Default => replay(item),
        }
    }
}

/// Built-in hit writer.
///
/// Items with stored headers are replayed verbatim with their status code.
/// Bare payloads get the default JSON content type.
pub fn replay(item: &CacheItem) -> Response {
    let mut response = Response::new(Body::from(item.body.clone()));
    *response.status_mut() = StatusCode::from_u16(item.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    if item.headers.is_empty() {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
        );
        return response;
    }

    for (name, value) in &item.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = %name, "Skipping invalid stored header"),
        }
    }
    response
}
