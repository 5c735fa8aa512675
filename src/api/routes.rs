//! API Routes
//!
//! Configures the demo router, wrapping the ping routes with caching rules.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, ping_path, ping_query, ping_update, stats_handler, AppState,
};
use crate::middleware::{Cacheable, Caching, EvictRule};

/// Cache key for `GET /ping?id=&hash=`.
pub const PING_QUERY_KEY: &str = "anson:userId:#id# hash:#hash#";
/// Cache key for `GET /ping/:id/:hash`.
pub const PING_PATH_KEY: &str = "anson:userId:#id# path:#hash#";
/// Eviction pattern for `POST /ping`: every cached ping of one user.
pub const PING_EVICT_PATTERN: &str = "anson:userId:#id#*";

/// Creates the demo router.
///
/// # Endpoints
/// - `GET /ping?id=&hash=` - cached under [`PING_QUERY_KEY`]
/// - `GET /ping/:id/:hash` - cached under [`PING_PATH_KEY`]
/// - `POST /ping` - evicts [`PING_EVICT_PATTERN`]
/// - `GET /stats` - engine counters
/// - `GET /health` - health check
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let engine = &state.engine;

    let ping = engine
        .handler(
            Caching::new().cache(Cacheable::new(PING_QUERY_KEY)),
            get(ping_query),
        )
        .merge(engine.handler(
            Caching::new().evict(EvictRule::pattern(PING_EVICT_PATTERN)),
            post(ping_update),
        ));

    let ping_by_path = engine.handler(
        Caching::new().cache(Cacheable::new(PING_PATH_KEY)),
        get(ping_path),
    );

    Router::new()
        .route("/ping", ping)
        .route("/ping/:id/:hash", ping_by_path)
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
