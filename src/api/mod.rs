//! API Module
//!
//! Demo HTTP handlers and routing for the caching middleware.
//!
//! # Endpoints
//! - `GET /ping?id=&hash=` - Cached ping keyed by query parameters
//! - `GET /ping/:id/:hash` - Cached ping keyed by path variables
//! - `POST /ping` - Evicts every cached ping of a user
//! - `GET /stats` - Cache engine statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::{create_router, PING_EVICT_PATTERN, PING_PATH_KEY, PING_QUERY_KEY};
