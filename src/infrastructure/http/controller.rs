//! HTTP controller (driver adapter).
//!
//! Axum-based REST + WebSocket surface delegating to the cache, warming,
//! connection-manager, and backtest components (`spec.md` §6).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backtest::{engine, optimize};
use crate::cache::multi_tier::MultiTierCache;
use crate::cache::warming::WarmingController;
use crate::error::ChronoError;
use crate::monitor::PerformanceMonitor;
use crate::realtime::ConnectionManager;

use super::request::{
    BacktestGridRequest, BacktestOptimizeRequest, CacheClearRequest, CacheRefreshRequest,
    CacheWarmRequest,
};
use super::response::{
    BacktestGridResponse, BacktestOptimizeResponse, CacheClearResponse, CacheHealthResponse,
    CacheRefreshResponse, CacheStatsResponse, CacheWarmResponse, WarmingStatsResponse,
};
use super::ws;

/// Application state shared across every handler.
///
/// Concrete (not generic over ports): every component ChronoRetrace Core
/// wires together is a single, fixed implementation chosen at startup, so
/// the teacher's `AppState<B, R, O, E>` port-generic shape is unnecessary
/// here.
#[derive(Clone)]
pub struct AppState {
    /// Multi-tier cache (D), the shared backing store for warmed data.
    pub cache: Arc<MultiTierCache>,
    /// Cache warming controller (E).
    pub warming: Arc<WarmingController>,
    /// Performance monitor (F).
    pub monitor: Arc<PerformanceMonitor>,
    /// Real-time connection manager (G).
    pub connections: Arc<ConnectionManager>,
    /// Age beyond which `POST /cache/refresh` considers an entry stale
    /// enough to re-fetch (`spec.md` §4.5(d)).
    pub stale_threshold: Duration,
    /// Crate version, surfaced on health checks.
    pub version: String,
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Build the full Axum router over every endpoint `spec.md` §6 names as a
/// stable contract.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cache/warm", post(cache_warm))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(cache_clear))
        .route("/cache/refresh", post(cache_refresh))
        .route("/cache/health", get(cache_health))
        .route("/ws/{client_id}", get(websocket_upgrade))
        .route("/backtest/grid", post(backtest_grid))
        .route("/backtest/grid/optimize", post(backtest_grid_optimize))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Namespaces `POST /cache/warm` can target, matching the boolean flags in
/// [`CacheWarmRequest`].
const WARM_NAMESPACES: &[(&str, fn(&CacheWarmRequest) -> bool)] = &[
    ("hot_stocks", |r| r.warm_hot_stocks),
    ("stock_info", |r| r.warm_stock_info),
    ("recent_data", |r| r.warm_recent_data),
];

async fn cache_warm(
    State(state): State<AppState>,
    Json(request): Json<CacheWarmRequest>,
) -> Result<Json<CacheWarmResponse>, ChronoError> {
    let started_at = now_millis();
    let mut succeeded = 0;
    let mut failed = 0;

    for (namespace, selected) in WARM_NAMESPACES {
        if !selected(&request) {
            continue;
        }
        let run = match &request.stock_codes {
            Some(ids) => {
                state
                    .warming
                    .warm_ids(namespace, ids, request.force_refresh)
                    .await?
            }
            None => state.warming.warm_namespace(namespace).await?,
        };
        succeeded += run.succeeded;
        failed += run.failed;
    }

    Ok(Json(CacheWarmResponse {
        accepted: state.warming.healthy(),
        started_at,
        succeeded,
        failed,
    }))
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let local_stats = state.cache.local().stats();
    let memory_usage = state.cache.remote().info().await.ok().and_then(|info| info.used_memory_bytes);
    let (succeeded, failed, runs) = state.warming.stats();

    Json(CacheStatsResponse {
        total_keys: local_stats.entry_count,
        memory_usage,
        hit_rate: local_stats.hit_rate(),
        miss_rate: 1.0 - local_stats.hit_rate(),
        warming_stats: WarmingStatsResponse {
            succeeded,
            failed,
            runs,
        },
        last_warming_time: state.warming.last_run_at(),
    })
}

async fn cache_clear(
    State(state): State<AppState>,
    Json(request): Json<CacheClearRequest>,
) -> Result<Json<CacheClearResponse>, ChronoError> {
    let cleared = if request.clear_all {
        state.cache.invalidate_pattern("*").await?
    } else {
        let pattern = request
            .pattern
            .ok_or_else(|| ChronoError::invalid_request("pattern is required unless clear_all is set"))?;
        state.cache.invalidate_pattern(&pattern).await?
    };
    Ok(Json(CacheClearResponse { cleared }))
}

async fn cache_refresh(
    State(state): State<AppState>,
    Json(request): Json<CacheRefreshRequest>,
) -> Result<Json<CacheRefreshResponse>, ChronoError> {
    let mut succeeded = 0;
    let mut failed = 0;

    for (namespace, _) in WARM_NAMESPACES {
        let run = match &request.stock_codes {
            Some(ids) => {
                state
                    .warming
                    .stale_refresh(namespace, ids, state.stale_threshold)
                    .await?
            }
            None => {
                state
                    .warming
                    .stale_refresh_namespace(namespace, state.stale_threshold)
                    .await?
            }
        };
        succeeded += run.succeeded;
        failed += run.failed;
    }

    Ok(Json(CacheRefreshResponse { succeeded, failed }))
}

async fn cache_health(State(state): State<AppState>) -> Json<CacheHealthResponse> {
    let redis_up = state.cache.remote().ping().await.unwrap_or(false);
    let warming_healthy = state.warming.healthy();
    let status = if redis_up && warming_healthy {
        "healthy"
    } else {
        "degraded"
    };

    Json(CacheHealthResponse {
        status: status.to_string(),
        redis_status: if redis_up { "up" } else { "down" }.to_string(),
        warming_service_status: if warming_healthy { "healthy" } else { "degraded" }.to_string(),
        checked_at: now_millis(),
    })
}

/// Query parameters accepted on the WebSocket upgrade route.
#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(_query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| ws::handle_socket(socket, client_id, state.connections))
}

async fn backtest_grid(
    Json(request): Json<BacktestGridRequest>,
) -> Result<Json<BacktestGridResponse>, ChronoError> {
    let result = engine::run(&request.config, &request.bars)?;
    Ok(Json(BacktestGridResponse {
        result,
        market_type: request.config.market,
        config: request.config,
    }))
}

async fn backtest_grid_optimize(
    Json(request): Json<BacktestOptimizeRequest>,
) -> Result<Json<BacktestOptimizeResponse>, ChronoError> {
    let runs = optimize::run_sweep(request.optimize, request.bars).await?;
    Ok(Json(BacktestOptimizeResponse { runs }))
}
