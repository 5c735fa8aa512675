//! API Handlers
//!
//! Demo handlers for the cached routes, plus stats and health.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::{CacheError, Result};
use crate::middleware::CacheEngine;
use crate::models::{HealthResponse, PingResponse, PingUpdate, StatsResponse};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: CacheEngine,
    /// Number of times a ping handler actually ran (cache hits don't count)
    pub handler_calls: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(engine: CacheEngine) -> Self {
        Self {
            engine,
            handler_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handler_calls(&self) -> u64 {
        self.handler_calls.load(Ordering::Relaxed)
    }

    fn count_call(&self) {
        self.handler_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Query string for `GET /ping`.
#[derive(Debug, Default, Deserialize)]
pub struct PingQuery {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub hash: String,
}

/// Handler for GET /ping?id=&hash=
pub async fn ping_query(
    State(state): State<AppState>,
    Query(query): Query<PingQuery>,
) -> Json<PingResponse> {
    state.count_call();
    Json(PingResponse::new(query.id, query.hash))
}

/// Handler for GET /ping/:id/:hash
///
/// Echoes the path variables as `X-ID` / `X-Hash` headers, which a full
/// capture replays on hits.
pub async fn ping_path(
    State(state): State<AppState>,
    Path((id, hash)): Path<(String, String)>,
) -> Response {
    state.count_call();
    let headers = [("x-id", id.clone()), ("x-hash", hash.clone())];
    (headers, Json(PingResponse::new(id, hash))).into_response()
}

/// Handler for POST /ping
///
/// The route's eviction rule drops every cached ping for `id`.
pub async fn ping_update(
    State(state): State<AppState>,
    Json(req): Json<PingUpdate>,
) -> Result<Json<PingResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.count_call();
    let hash = req.hash.unwrap_or_default();
    Ok(Json(PingResponse::new(req.id, hash)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let total_entries = state.engine.memory_store().map(|store| store.len());
    Json(StatsResponse::new(state.engine.stats(), total_entries))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
