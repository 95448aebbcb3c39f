//! HTTP request DTOs (`spec.md` §6).

use serde::{Deserialize, Serialize};

use crate::backtest::optimize::OptimizeRequest;
use crate::domain::grid::GridConfig;

/// `POST /cache/warm` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheWarmRequest {
    /// Explicit ids to warm; when absent, every id the namespace's
    /// provider lists is warmed.
    #[serde(default)]
    pub stock_codes: Option<Vec<String>>,
    /// Bypass the read-through check and overwrite existing entries.
    #[serde(default)]
    pub force_refresh: bool,
    /// Warm the `hot_stocks` namespace.
    #[serde(default)]
    pub warm_hot_stocks: bool,
    /// Warm the `stock_info` namespace.
    #[serde(default)]
    pub warm_stock_info: bool,
    /// Warm the `recent_data` namespace.
    #[serde(default)]
    pub warm_recent_data: bool,
}

/// `POST /cache/clear` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearRequest {
    /// Glob pattern to invalidate; ignored when `clear_all` is set.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Invalidate every namespace this service knows about.
    #[serde(default)]
    pub clear_all: bool,
}

/// `POST /cache/refresh` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRefreshRequest {
    /// Ids to refresh; when absent, every registered namespace is
    /// stale-refreshed.
    #[serde(default)]
    pub stock_codes: Option<Vec<String>>,
}

/// `POST /backtest/grid` request body: the grid-strategy configuration and
/// the bar series to simulate over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestGridRequest {
    /// Grid-strategy configuration (`spec.md` §3).
    pub config: GridConfig,
    /// OHLCV bars to simulate over, in ascending date order.
    pub bars: Vec<crate::domain::market_data::Bar>,
}

/// `POST /backtest/grid/optimize` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOptimizeRequest {
    /// Parameter sweep configuration.
    pub optimize: OptimizeRequest,
    /// OHLCV bars to simulate over, in ascending date order.
    pub bars: Vec<crate::domain::market_data::Bar>,
}
