//! ChronoRetrace Core binary entry point.
//!
//! Wires the multi-tier cache, warming controller, performance monitor, and
//! real-time connection manager into a single Axum server, then serves
//! until a shutdown signal arrives (`spec.md` §6).
//!
//! # Environment variables
//!
//! - `CONFIG_PATH`: path to the YAML config file (default: `config.yaml`,
//!   missing file falls back to built-in defaults).
//! - `RUST_LOG`: `tracing-subscriber` filter directive, overrides
//!   `observability.log_filter` from config.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chronoretrace_core::cache::{
    HttpDataProvider, LocalCache, MultiTierCache, RedisCache, RemoteCachePort, WarmingController,
};
use chronoretrace_core::config::{self, Config};
use chronoretrace_core::infrastructure::http::{AppState, create_router};
use chronoretrace_core::monitor::{self, PerformanceMonitor};
use chronoretrace_core::realtime::ConnectionManager;
use chronoretrace_core::telemetry;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config();
    telemetry::init_telemetry(&config.observability.log_filter);
    if let Err(err) = monitor::init_metrics(&config.observability.metrics_listen_addr) {
        eprintln!("warning: metrics exporter not started ({err})");
    }

    tracing::info!(
        bind_address = %config.server.bind_address,
        port = config.server.port,
        "starting chronoretrace-core"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let local_cache = Arc::new(LocalCache::new(config.local_cache.capacity));
    let remote_cache: Arc<dyn RemoteCachePort> = Arc::new(
        RedisCache::connect(&config.remote_cache.url)
            .await
            .map_err(|err| format!("failed to connect to remote cache: {err}"))?,
    );
    let monitor = Arc::new(PerformanceMonitor::new(config.monitor.sample_ring_capacity));
    monitor.spawn_sampler(
        Duration::from_secs(config.monitor.sample_interval_secs),
        shutdown_rx.clone(),
    );

    let cache = Arc::new(MultiTierCache::new(
        local_cache,
        remote_cache,
        Arc::clone(&monitor),
        "chronoretrace",
    ));

    let warming = Arc::new(WarmingController::new(
        Arc::clone(&cache),
        config.warming.degraded_failure_ratio,
    ));
    let default_ttl = Duration::from_secs(config.local_cache.default_ttl_secs);
    let upstream_base_url =
        std::env::var("UPSTREAM_DATA_PROVIDER_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
    for namespace in ["hot_stocks", "stock_info", "recent_data"] {
        warming.register_namespace(
            namespace,
            Arc::new(HttpDataProvider::new(upstream_base_url.clone())),
            default_ttl,
        );
    }
    warming.spawn_scheduler(
        Duration::from_secs(config.warming.scheduled_interval_secs),
        shutdown_rx.clone(),
    );

    let connections = Arc::new(ConnectionManager::new(
        config.realtime.outbound_queue_capacity,
        Duration::from_secs(config.realtime.idle_timeout_secs),
    ));
    connections.spawn_heartbeat(
        Duration::from_secs(config.realtime.heartbeat_interval_secs),
        shutdown_rx.clone(),
    );

    let state = AppState {
        cache,
        warming,
        monitor,
        connections,
        stale_threshold: Duration::from_secs(config.warming.stale_threshold_secs),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP/WebSocket server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    tracing::info!("chronoretrace-core stopped");
    Ok(())
}

fn load_config() -> Config {
    let path = std::env::var("CONFIG_PATH").ok();
    match config::load_config(path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("warning: using default config ({err})");
            Config::default()
        }
    }
}

/// Wait for Ctrl+C or SIGTERM, then broadcast shutdown to every background
/// task via `shutdown_tx`.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
