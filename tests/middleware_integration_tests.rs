//! Integration Tests for the Caching Middleware
//!
//! Wraps small handlers with caching rules and checks hit / miss / evict
//! behavior through real axum routers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Path,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use route_cache::{
    config::CaptureMode, CacheEngine, CacheItem, Cacheable, Caching, EvictRule, KeySpec,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

fn engine() -> CacheEngine {
    CacheEngine::memory(Duration::from_secs(300)).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Handler that counts its invocations and echoes a fixed body.
fn counting(calls: &Arc<AtomicUsize>, body: &'static str) -> axum::routing::MethodRouter {
    let calls = calls.clone();
    get(move || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            body
        }
    })
}

// == Hit Callback Chain ==

#[tokio::test]
async fn test_default_hit_writer_for_body_capture() {
    let engine = engine().with_capture_mode(CaptureMode::Body);
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new().route(
        "/data",
        engine.handler(
            Caching::new().cache(Cacheable::new("data:#id#")),
            counting(&calls, r#"{"value":1}"#),
        ),
    );

    send(&app, "GET", "/data?id=1", None).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/data?id=1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/json; charset=utf-8"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hit_callback_precedence() {
    let engine = engine().with_hit_callback(|item| {
        (StatusCode::OK, format!("engine:{}", item.body_str())).into_response()
    });
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route(
            "/rule",
            engine.handler(
                Caching::new().cache(
                    Cacheable::new("rule:#id#")
                        .on_hit(|item| format!("rule:{}", item.body_str()).into_response()),
                ),
                counting(&calls, "a"),
            ),
        )
        .route(
            "/engine",
            engine.handler(
                Caching::new().cache(Cacheable::new("engine:#id#")),
                counting(&calls, "b"),
            ),
        );

    assert_eq!(send(&app, "GET", "/rule?id=1", None).await.1, "a");
    assert_eq!(send(&app, "GET", "/rule?id=1", None).await.1, "rule:a");
    assert_eq!(send(&app, "GET", "/engine?id=1", None).await.1, "b");
    assert_eq!(send(&app, "GET", "/engine?id=1", None).await.1, "engine:b");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Parameter Sources ==

#[tokio::test]
async fn test_path_variables_feed_the_key() {
    let engine = engine();

    let app = Router::new().route(
        "/users/:id",
        engine.handler(
            Caching::new().cache(Cacheable::new("user:#id#")),
            get(|Path(id): Path<String>| async move { format!("user {}", id) }),
        ),
    );

    send(&app, "GET", "/users/Alice", None).await;

    let stored = engine.load("user:alice").await.unwrap();
    assert_eq!(stored.body_str(), "user Alice");
}

#[tokio::test]
async fn test_json_body_feeds_the_key() {
    let engine = engine();

    let app = Router::new().route(
        "/items",
        engine.handler(
            Caching::new().cache(Cacheable::new("item:#id#:#name#")),
            put(|Json(body): Json<Value>| async move { Json(body) }),
        ),
    );

    let (status, _) = send(
        &app,
        "PUT",
        "/items",
        Some(json!({"id": 42, "name": "Widget"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(engine.load("item:42:widget").await.is_some());
}

#[tokio::test]
async fn test_invalid_body_still_reaches_handler() {
    let engine = engine();

    let app = Router::new().route(
        "/items",
        engine.handler(
            Caching::new()
                .cache(Cacheable::new("item:#id#"))
                .evict(EvictRule::pattern("item:#id#*")),
            put(|body: String| async move { format!("got {}", body) }),
        ),
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/items")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"got {not json");

    // Key "item:" still resolves, so the response is stored under it.
    assert!(engine.load("item:").await.is_some());
    assert_eq!(engine.stats().evictions, 0);
}

// == Key Functions ==

#[tokio::test]
async fn test_key_function_and_empty_key_skip() {
    let engine = engine();
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new().route(
        "/fn",
        engine.handler(
            Caching::new().cache(Cacheable::new(KeySpec::function(|p| {
                if p.contains("token") {
                    format!("Token:{}", p.get("token"))
                } else {
                    String::new()
                }
            }))),
            counting(&calls, "fn"),
        ),
    );

    send(&app, "GET", "/fn?token=XYZ", None).await;
    send(&app, "GET", "/fn?token=XYZ", None).await;
    send(&app, "GET", "/fn", None).await;
    send(&app, "GET", "/fn", None).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(engine.load("token:xyz").await.is_some());
    assert_eq!(engine.stats().skipped, 2);
}

// == Eviction ==

#[tokio::test]
async fn test_named_eviction_across_caches() {
    let engine = engine();
    engine.set("users:id:1", CacheItem::text("u"), None).await;
    engine.set("profiles:id:1", CacheItem::text("p"), None).await;
    engine.set("profiles:id:2", CacheItem::text("p2"), None).await;

    let app = Router::new().route(
        "/users",
        engine.handler(
            Caching::new().evict(EvictRule::named(["users", "profiles"], "id:#id#")),
            post(|| async { StatusCode::NO_CONTENT }),
        ),
    );

    let (status, _) = send(&app, "POST", "/users", Some(json!({"id": "1"}))).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(engine.load("users:id:1").await.is_none());
    assert!(engine.load("profiles:id:1").await.is_none());
    assert!(engine.load("profiles:id:2").await.is_some());
}

#[tokio::test]
async fn test_eviction_runs_even_when_handler_fails() {
    let engine = engine();
    engine.set("anson:userid:1 hash:x", CacheItem::text("x"), None).await;

    let app = Router::new().route(
        "/ping",
        engine.handler(
            Caching::new().evict(EvictRule::pattern("anson:userId:#id#*")),
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ),
    );

    let (status, _) = send(&app, "POST", "/ping", Some(json!({"id": "1"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(engine.load("anson:userid:1 hash:x").await.is_none());
}

#[tokio::test]
async fn test_combined_evict_then_cache() {
    let engine = engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let app = Router::new().route(
        "/refresh",
        engine.handler(
            Caching::new()
                .cache(Cacheable::new("refresh:#id#"))
                .evict(EvictRule::pattern("other:#id#*")),
            post(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    format!("call {}", n)
                }
            }),
        ),
    );
    engine.set("other:1:a", CacheItem::text("a"), None).await;

    let (_, body) = send(&app, "POST", "/refresh", Some(json!({"id": "1"}))).await;
    assert_eq!(body, "call 1");
    assert!(engine.load("other:1:a").await.is_none());

    engine.set("other:1:b", CacheItem::text("b"), None).await;

    // A hit still runs the route's evictions.
    let (_, body) = send(&app, "POST", "/refresh", Some(json!({"id": "1"}))).await;
    assert_eq!(body, "call 1");
    assert!(engine.load("other:1:b").await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// == TTL ==

#[tokio::test]
async fn test_rule_ttl_expires_entry() {
    let engine = engine();
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new().route(
        "/short",
        engine.handler(
            Caching::new().cache(Cacheable::new("short:#id#").ttl(Duration::from_millis(150))),
            counting(&calls, "short"),
        ),
    );

    send(&app, "GET", "/short?id=1", None).await;
    send(&app, "GET", "/short?id=1", None).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;

    send(&app, "GET", "/short?id=1", None).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Concurrency ==

#[tokio::test]
async fn test_concurrent_misses_store_one_entry() {
    let engine = engine();
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new().route(
        "/busy",
        engine.handler(
            Caching::new().cache(Cacheable::new("busy:#id#")),
            counting(&calls, "busy"),
        ),
    );

    let requests: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { send(&app, "GET", "/busy?id=1", None).await })
        })
        .collect();

    for request in requests {
        let (status, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "busy");
    }

    assert_eq!(engine.memory_store().unwrap().len(), 1);
    assert_eq!(engine.memory_store().unwrap().pending_timers(), 1);
}

// == Backend Failures ==

#[tokio::test]
async fn test_unreachable_redis_serves_every_request_from_handler() {
    // Nothing listens on port 1; every store call fails to connect.
    let engine = CacheEngine::redis("redis://127.0.0.1:1", Duration::from_secs(60)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new().route(
        "/down",
        engine.handler(
            Caching::new()
                .cache(Cacheable::new("down:#id#"))
                .evict(EvictRule::pattern("other:#id#*")),
            counting(&calls, "fresh"),
        ),
    );

    for _ in 0..2 {
        let (status, body) = send(&app, "GET", "/down?id=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "fresh");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let stats = engine.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.stores, 0);
}

// == Body Limit ==

fn limited_echo(limit: usize, calls: &Arc<AtomicUsize>) -> (CacheEngine, Router) {
    let engine = engine().with_body_limit(limit);
    let calls = calls.clone();

    let app = Router::new().route(
        "/upload",
        engine.handler(
            Caching::new().cache(Cacheable::new("upload:#id#")),
            post(move |body: String| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    format!("{} bytes", body.len())
                }
            }),
        ),
    );

    (engine, app)
}

#[tokio::test]
async fn test_declared_oversized_body_bypasses_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (engine, app) = limited_echo(16, &calls);
    let payload = json!({"id": "1", "padding": "x".repeat(64)}).to_string();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header("content-type", "application/json")
                    .header("content-length", payload.len())
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], format!("{} bytes", payload.len()).as_bytes());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.memory_store().unwrap().len(), 0);
    assert_eq!(engine.stats().skipped, 2);
}

#[tokio::test]
async fn test_undeclared_oversized_body_is_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (engine, app) = limited_echo(16, &calls);

    let (status, body) = send(
        &app,
        "POST",
        "/upload",
        Some(json!({"id": "1", "padding": "x".repeat(64)})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body.contains("error"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.memory_store().unwrap().len(), 0);
}

#[tokio::test]
async fn test_small_body_under_limit_is_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (engine, app) = limited_echo(64, &calls);

    send(&app, "POST", "/upload", Some(json!({"id": "1"}))).await;
    send(&app, "POST", "/upload", Some(json!({"id": "1"}))).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(engine.load("upload:1").await.is_some());
}
