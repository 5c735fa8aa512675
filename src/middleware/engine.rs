//! Cache Engine
//!
//! The per-request control loop: resolve the key, serve hits, run the
//! wrapped handler on misses, evict, and store what the handler produced.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use tracing::{debug, warn};

use super::capture::{capture, CapturedResponse};
use super::hit::HitHandler;
use super::params::RequestParams;
use super::rules::{Caching, HitCallback};
use crate::cache::{CacheItem, CacheStats, CacheStore, MemoryStore, RedisStore, StatsRecorder};
use crate::config::{Backend, CaptureMode, Config, DEFAULT_BODY_LIMIT};
use crate::error::{CacheError, Result};

// == Cache Engine ==
/// Shared caching engine. Cloning is cheap; clones share the store and stats.
#[derive(Clone)]
pub struct CacheEngine {
    store: Arc<dyn CacheStore>,
    /// Set when the engine owns an in-memory store, for the sweep task
    memory: Option<MemoryStore>,
    on_hit: Option<HitCallback>,
    capture_mode: CaptureMode,
    /// Largest request body buffered for parameter extraction
    body_limit: usize,
    stats: Arc<StatsRecorder>,
}

impl CacheEngine {
    // == Constructors ==
    /// Wraps any store backend.
    pub fn new<S>(store: S) -> Self
    where
        S: CacheStore + 'static,
    {
        Self {
            store: Arc::new(store),
            memory: None,
            on_hit: None,
            capture_mode: CaptureMode::default(),
            body_limit: DEFAULT_BODY_LIMIT,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    /// Engine over a fresh in-memory store. Fails when `default_ttl` is zero.
    pub fn memory(default_ttl: Duration) -> Result<Self> {
        let store = MemoryStore::new(default_ttl)?;
        let mut engine = Self::new(store.clone());
        engine.memory = Some(store);
        Ok(engine)
    }

    /// Engine over Redis at `url`. Fails on a bad URL or a zero `default_ttl`.
    pub fn redis(url: &str, default_ttl: Duration) -> Result<Self> {
        Ok(Self::new(RedisStore::new(url, default_ttl)?))
    }

    /// Builds the engine described by `config`, validating it first.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let default_ttl = Duration::from_secs(config.default_ttl);

        let engine = match config.backend {
            Backend::Memory => Self::memory(default_ttl)?,
            Backend::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    CacheError::Config("REDIS_URL is required for the Redis backend".to_string())
                })?;
                Self::redis(url, default_ttl)?
            }
        };

        Ok(engine
            .with_capture_mode(config.capture_mode)
            .with_body_limit(config.body_limit))
    }

    /// Engine-wide hit callback, used when the matched rule has none.
    pub fn with_hit_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CacheItem) -> Response + Send + Sync + 'static,
    {
        self.on_hit = Some(Arc::new(callback));
        self
    }

    pub fn with_capture_mode(mut self, mode: CaptureMode) -> Self {
        self.capture_mode = mode;
        self
    }

    /// Requests declaring a larger body bypass the cache untouched.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    /// The in-memory store, when this engine was built over one.
    pub fn memory_store(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Store Access ==
    /// Looks up `key`. Backend failures are logged and read as a miss.
    pub async fn load(&self, key: &str) -> Option<CacheItem> {
        match self.store.load(key).await {
            Ok(item) => item.filter(|item| !item.is_empty()),
            Err(e) => {
                warn!(key = key, error = %e, "Cache load failed, treating as miss");
                None
            }
        }
    }

    /// Stores `item`. Backend failures are logged and ignored.
    pub async fn set(&self, key: &str, item: CacheItem, ttl: Option<Duration>) -> bool {
        match self.store.set(key, item, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = key, error = %e, "Cache set failed");
                false
            }
        }
    }

    /// Evicts keys and `*` patterns. Backend failures are logged and ignored.
    pub async fn evict(&self, keys: &[String]) {
        if let Err(e) = self.store.evict(keys).await {
            warn!(keys = ?keys, error = %e, "Cache evict failed");
        }
    }

    // == Route Wrapping ==
    /// Wraps a route so its responses are cached and evicted per `caching`.
    ///
    /// ```ignore
    /// let app = Router::new().route(
    ///     "/ping",
    ///     engine.handler(
    ///         Caching::new().cache(Cacheable::new("anson:userId:#id#")),
    ///         get(ping),
    ///     ),
    /// );
    /// ```
    pub fn handler<S>(&self, caching: Caching, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let state = CachedRoute {
            engine: self.clone(),
            caching: Arc::new(caching),
        };
        route.route_layer(middleware::from_fn_with_state(state, cache_middleware))
    }

    // == Process ==
    /// Runs one request through the hit / miss / evict protocol.
    pub async fn process(&self, caching: &Caching, req: Request, next: Next) -> Response {
        if caching.is_empty() {
            return next.run(req).await;
        }

        if declared_length(&req).is_some_and(|len| len > self.body_limit) {
            self.stats.record_skip();
            debug!(uri = %req.uri(), limit = self.body_limit, "Request body over limit, bypassing cache");
            return next.run(req).await;
        }

        let (mut parts, body) = req.into_parts();
        // Without a Content-Length the body is gone once the limit trips.
        let body = match to_bytes(body, self.body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(uri = %parts.uri, error = %e, "Failed to buffer request body");
                return CacheError::RequestBody(e.to_string()).into_response();
            }
        };
        let params = RequestParams::from_parts(&mut parts, &body).await;

        let rule = caching.cacheable.first();
        let key = match rule {
            Some(rule) => {
                let key = rule.key.resolve(&params);
                if key.is_empty() {
                    self.stats.record_skip();
                    debug!(uri = %parts.uri, "Cache key resolved empty, skipping cache");
                    None
                } else {
                    Some(key)
                }
            }
            None => None,
        };

        if let (Some(rule), Some(key)) = (rule, key.as_deref()) {
            if let Some(item) = self.load(key).await {
                self.stats.record_hit();
                debug!(key = key, "Cache hit");

                let response =
                    HitHandler::select(rule.on_hit.as_ref(), self.on_hit.as_ref()).respond(&item);
                self.run_evictions(caching, &params).await;
                return response;
            }
            self.stats.record_miss();
            debug!(key = key, "Cache miss");
        }

        let req = Request::from_parts(parts, Body::from(body));
        let response = next.run(req).await;

        self.run_evictions(caching, &params).await;

        let (Some(rule), Some(key)) = (rule, key) else {
            return response;
        };

        let CapturedResponse { response, item } = match capture(response, self.capture_mode).await
        {
            Ok(captured) => captured,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to capture handler response");
                return e.into_response();
            }
        };

        if !response.status().is_success() {
            debug!(key = %key, status = %response.status(), "Not caching unsuccessful response");
            return response;
        }

        // Another request may have filled the key while this one ran.
        if self.load(&key).await.is_none() && self.set(&key, item, rule.ttl).await {
            self.stats.record_store();
            debug!(key = %key, "Cached handler response");
        }

        response
    }

    async fn run_evictions(&self, caching: &Caching, params: &RequestParams) {
        if caching.evict.is_empty() {
            return;
        }

        let keys: Vec<String> = caching
            .evict
            .iter()
            .flat_map(|rule| rule.resolve(params))
            .collect();

        if keys.is_empty() {
            debug!("Eviction rules resolved no keys, skipping evict");
            return;
        }

        self.stats.record_eviction();
        self.evict(&keys).await;
    }
}

/// Body length announced by the `Content-Length` header, if parseable.
fn declared_length(req: &Request) -> Option<usize> {
    req.headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Middleware state for one wrapped route.
#[derive(Clone)]
struct CachedRoute {
    engine: CacheEngine,
    caching: Arc<Caching>,
}

async fn cache_middleware(
    State(route): State<CachedRoute>,
    req: Request,
    next: Next,
) -> Response {
    route.engine.process(&route.caching, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Cacheable, EvictRule};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn engine() -> CacheEngine {
        CacheEngine::memory(Duration::from_secs(3600)).unwrap()
    }

    async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_memory_engine_rejects_zero_ttl() {
        assert!(matches!(
            CacheEngine::memory(Duration::ZERO),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_validates() {
        let config = Config {
            default_ttl: 0,
            ..Config::default()
        };
        assert!(CacheEngine::from_config(&config).is_err());

        let config = Config {
            capture_mode: CaptureMode::Body,
            ..Config::default()
        };
        let engine = CacheEngine::from_config(&config).unwrap();
        assert_eq!(engine.capture_mode(), CaptureMode::Body);
        assert_eq!(engine.body_limit(), DEFAULT_BODY_LIMIT);
        assert!(engine.memory_store().is_some());

        let config = Config {
            body_limit: 1024,
            ..Config::default()
        };
        assert_eq!(CacheEngine::from_config(&config).unwrap().body_limit(), 1024);
    }

    #[tokio::test]
    async fn test_hit_skips_handler() {
        let engine = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let app = Router::new().route(
            "/ping",
            engine.handler(
                Caching::new().cache(Cacheable::new("anson:userId:#id# hash:#hash#")),
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "pong"
                    }
                }),
            ),
        );

        let first = send(&app, "GET", "/ping?id=1&hash=anson", "").await;
        let second = send(&app, "GET", "/ping?id=1&hash=anson", "").await;

        assert_eq!(first, (StatusCode::OK, "pong".to_string()));
        assert_eq!(second, (StatusCode::OK, "pong".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored = engine.load("anson:userid:1 hash:anson").await.unwrap();
        assert_eq!(stored.body_str(), "pong");

        let stats = engine.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
    }

    #[tokio::test]
    async fn test_empty_key_skips_cache() {
        let engine = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let app = Router::new().route(
            "/ping",
            engine.handler(
                Caching::new().cache(Cacheable::new(crate::middleware::KeySpec::function(
                    |p| p.get("id").to_string(),
                ))),
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "pong"
                    }
                }),
            ),
        );

        send(&app, "GET", "/ping", "").await;
        send(&app, "GET", "/ping", "").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.stats().skipped, 2);
        assert_eq!(engine.memory_store().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_failed_responses_are_not_cached() {
        let engine = engine();

        let app = Router::new().route(
            "/broken",
            engine.handler(
                Caching::new().cache(Cacheable::new("broken:#id#")),
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            ),
        );

        let (status, body) = send(&app, "GET", "/broken?id=1", "").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "boom");
        assert!(engine.load("broken:1").await.is_none());
    }

    #[tokio::test]
    async fn test_engine_hit_callback() {
        let engine = engine().with_hit_callback(|item| {
            (StatusCode::OK, format!("engine:{}", item.body_str())).into_response()
        });

        let app = Router::new().route(
            "/ping",
            engine.handler(
                Caching::new().cache(Cacheable::new("cb:#id#")),
                get(|| async { "pong" }),
            ),
        );

        send(&app, "GET", "/ping?id=1", "").await;
        let (_, body) = send(&app, "GET", "/ping?id=1", "").await;

        assert_eq!(body, "engine:pong");
    }

    #[tokio::test]
    async fn test_rule_hit_callback_overrides_engine() {
        let engine = engine().with_hit_callback(|_| "engine".into_response());

        let app = Router::new().route(
            "/ping",
            engine.handler(
                Caching::new().cache(
                    Cacheable::new("cb:#id#").on_hit(|_| "rule".into_response()),
                ),
                get(|| async { "pong" }),
            ),
        );

        send(&app, "GET", "/ping?id=1", "").await;
        let (_, body) = send(&app, "GET", "/ping?id=1", "").await;

        assert_eq!(body, "rule");
    }

    #[tokio::test]
    async fn test_post_body_is_replayed_to_handler() {
        let engine = engine();

        let app = Router::new().route(
            "/echo",
            engine.handler(
                Caching::new().cache(Cacheable::new("echo:#hash#")),
                post(|body: String| async move { body }),
            ),
        );

        let (_, body) = send(&app, "POST", "/echo", r#"{"hash":"h1"}"#).await;

        assert_eq!(body, r#"{"hash":"h1"}"#);
        let stored = engine.load("echo:h1").await.unwrap();
        assert_eq!(stored.body_str(), r#"{"hash":"h1"}"#);
    }

    #[tokio::test]
    async fn test_combined_rule_replaces_stale_entry() {
        let engine = engine();
        engine
            .set("anson:hash:h1", CacheItem::text("stale"), None)
            .await;

        let app = Router::new().route(
            "/pings",
            engine.handler(
                Caching::new()
                    .cache(Cacheable::new("anson:hash:#hash#"))
                    .evict(EvictRule::pattern("anson:hash:#hash#")),
                post(|body: String| async move { body }),
            ),
        );

        // The stale entry is a hit, then evicted by the same route.
        let (_, body) = send(&app, "POST", "/pings", r#"{"hash":"h1"}"#).await;
        assert_eq!(body, "stale");
        assert!(engine.load("anson:hash:h1").await.is_none());

        // The next call misses, runs the handler and stores fresh data.
        let (_, body) = send(&app, "POST", "/pings", r#"{"hash":"h1"}"#).await;
        assert_eq!(body, r#"{"hash":"h1"}"#);
        let stored = engine.load("anson:hash:h1").await.unwrap();
        assert_eq!(stored.body_str(), r#"{"hash":"h1"}"#);
    }

    #[tokio::test]
    async fn test_per_rule_ttl() {
        let engine = engine();

        let app = Router::new().route(
            "/short",
            engine.handler(
                Caching::new()
                    .cache(Cacheable::new("short:#id#").ttl(Duration::from_millis(100))),
                get(|| async { "soon gone" }),
            ),
        );

        send(&app, "GET", "/short?id=1", "").await;
        assert!(engine.load("short:1").await.is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(engine.load("short:1").await.is_none());
    }

    #[tokio::test]
    async fn test_body_within_limit_is_cached() {
        let engine = engine().with_body_limit(64);

        let app = Router::new().route(
            "/echo",
            engine.handler(
                Caching::new().cache(Cacheable::new("echo:#hash#")),
                post(|body: String| async move { body }),
            ),
        );

        let (status, _) = send(&app, "POST", "/echo", r#"{"hash":"h1"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert!(engine.load("echo:h1").await.is_some());
    }

    #[test]
    fn test_declared_length() {
        let req = axum::http::Request::builder()
            .header(CONTENT_LENGTH, "42")
            .body(Body::empty())
            .unwrap();
        assert_eq!(declared_length(&req), Some(42));

        let req = axum::http::Request::builder()
            .header(CONTENT_LENGTH, "lots")
            .body(Body::empty())
            .unwrap();
        assert_eq!(declared_length(&req), None);

        let req = axum::http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(declared_length(&req), None);
    }
}
