//! HTTP response DTOs (`spec.md` §6).

use serde::{Deserialize, Serialize};

use crate::backtest::engine::BacktestOutput;
use crate::backtest::optimize::OptimizeRun;
use crate::domain::grid::GridConfig;
use crate::domain::market_data::MarketType;

/// Response from `POST /cache/warm`: the run is accepted and runs to
/// completion before the response is returned (`spec.md` §6's
/// "task-accepted" contract is satisfied synchronously here since warms
/// complete quickly against the mock/HTTP provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheWarmResponse {
    /// Whether the run completed without exceeding the degraded-failure
    /// threshold.
    pub accepted: bool,
    /// Epoch milliseconds the run started at.
    pub started_at: i64,
    /// Items successfully warmed across every namespace touched.
    pub succeeded: u64,
    /// Items skipped after a provider or cache-write failure.
    pub failed: u64,
}

/// Response from `GET /cache/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    /// Entries currently held in the in-process tier.
    pub total_keys: u64,
    /// Remote store's reported memory usage, in bytes, if available.
    pub memory_usage: Option<u64>,
    /// In-process tier hit rate in `[0, 1]`.
    pub hit_rate: f64,
    /// In-process tier miss rate in `[0, 1]`.
    pub miss_rate: f64,
    /// Cumulative warming success/failure/run counts.
    pub warming_stats: WarmingStatsResponse,
    /// Epoch milliseconds of the most recent warm run, if any has run.
    pub last_warming_time: Option<i64>,
}

/// Cumulative warming counters embedded in [`CacheStatsResponse`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WarmingStatsResponse {
    /// Total successful warm operations since startup.
    pub succeeded: u64,
    /// Total failed warm operations since startup.
    pub failed: u64,
    /// Number of completed warm runs since startup.
    pub runs: u64,
}

/// Response from `POST /cache/clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearResponse {
    /// Number of keys removed from the remote tier (local-tier removal is
    /// best-effort and not separately counted).
    pub cleared: u64,
}

/// Response from `POST /cache/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRefreshResponse {
    /// Items successfully refreshed.
    pub succeeded: u64,
    /// Items skipped after a failure.
    pub failed: u64,
}

/// Response from `GET /cache/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealthResponse {
    /// Overall status: `"healthy"` or `"degraded"`.
    pub status: String,
    /// Remote store reachability: `"up"` or `"down"`.
    pub redis_status: String,
    /// Warming controller status: `"healthy"` or `"degraded"`.
    pub warming_service_status: String,
    /// Epoch milliseconds this health check was evaluated at.
    pub checked_at: i64,
}

/// Response from `POST /backtest/grid`: the simulation result plus an
/// echo of the request inputs needed to render a chart without a second
/// round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestGridResponse {
    /// Full simulation output (metrics, equity curve, transaction log).
    pub result: BacktestOutput,
    /// Echo of the grid configuration that was simulated.
    pub config: GridConfig,
    /// Market the simulated symbol trades on.
    pub market_type: MarketType,
}

/// Response from `POST /backtest/grid/optimize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOptimizeResponse {
    /// Per-parameter-set result summaries.
    pub runs: Vec<OptimizeRun>,
}
