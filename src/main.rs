//! Route Cache - demo server
//!
//! Serves a few cached and evicting routes over the configured backend.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use route_cache::api::{create_router, AppState};
use route_cache::{spawn_sweep_task, CacheEngine, Config};

/// Startup:
/// 1. Initialize tracing
/// 2. Load and validate configuration
/// 3. Build the cache engine for the configured backend
/// 4. Start the sweep task (memory backend only)
/// 5. Serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "route_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Route Cache demo server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={:?}, default_ttl={}s, port={}, sweep_interval={}s, capture={:?}, body_limit={}B",
        config.backend,
        config.default_ttl,
        config.server_port,
        config.sweep_interval,
        config.capture_mode,
        config.body_limit
    );

    let engine = CacheEngine::from_config(&config).context("invalid cache configuration")?;
    info!("Cache engine initialized");

    let sweep_handle = engine
        .memory_store()
        .map(|store| spawn_sweep_task(store.clone(), config.sweep_interval));
    if sweep_handle.is_some() {
        info!("Background sweep task started");
    }

    let app = create_router(AppState::new(engine));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the sweep task.
async fn shutdown_signal(sweep_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = sweep_handle {
        handle.abort();
        warn!("Sweep task aborted");
    }
}
