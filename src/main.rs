//! Edge Cache - An in-memory HTTP caching reverse proxy
//!
//! Forwards requests to a single origin and serves repeat requests from a
//! TTL cache.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_cache::{create_router, Config, ProxyState, TtlCache};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from `CONFIG_FILE` or environment variables
/// 3. Start the cache and its background sweeper
/// 4. Create the proxy router
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM, drain in-flight cache writes and stop the sweeper
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edge_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Edge Cache proxy");

    let config = Config::load().context("failed to load configuration")?;
    info!(
        "Configuration loaded: origin={}, ttl={}s, sweep_interval={}s, port={}, static_headers={}",
        config.origin_url,
        config.ttl_secs,
        config.sweep_interval_secs,
        config.listen_port,
        config.headers.len()
    );

    let cache = Arc::new(TtlCache::from_config(&config));
    info!(
        ttl_secs = cache.store().ttl().as_secs(),
        "Cache started, background sweeper running"
    );

    let state = ProxyState::new(Arc::clone(&cache), &config)?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Proxy listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cache.shutdown().await;
    match serde_json::to_string(&cache.stats()) {
        Ok(stats) => info!("Final cache stats: {}", stats),
        Err(err) => error!("Failed to serialize cache stats: {}", err),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
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
}
