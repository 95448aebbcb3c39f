//! Parameter sweep over a grid of `(grid_count, upper_price, lower_price)`
//! combinations (`spec.md` §6 `POST /backtest/grid/optimize`, `SPEC_FULL.md`
//! §4.8 **[EXPANSION]**).
//!
//! Each combination is an independent, pure [`engine::run`] invocation with
//! no shared mutable state, so the sweep fans out across the blocking thread
//! pool rather than pulling in a second parallelism runtime alongside tokio.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::engine::{self, BacktestOutput};
use crate::domain::grid::GridConfig;
use crate::domain::market_data::Bar;
use crate::error::{ChronoError, ChronoResult};

/// One axis of the parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    /// Base configuration; `grid_count`/`upper_price`/`lower_price` are
    /// overridden per combination.
    pub base: GridConfig,
    /// Candidate grid counts.
    pub grid_counts: Vec<u32>,
    /// Candidate upper bounds.
    pub upper_prices: Vec<Decimal>,
    /// Candidate lower bounds.
    pub lower_prices: Vec<Decimal>,
}

/// Summary of one sweep combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRun {
    /// Grid count used for this run.
    pub grid_count: u32,
    /// Upper bound used for this run.
    pub upper_price: Decimal,
    /// Lower bound used for this run.
    pub lower_price: Decimal,
    /// Run outcome; `None` if the combination was rejected (`INVALID_CONFIG`
    /// or `NO_DATA_IN_RANGE`) rather than simulated.
    pub output: Option<BacktestOutput>,
    /// Error message, if the run failed.
    pub error: Option<String>,
}

/// Run the cartesian sweep described by `request` against `bars`, using a
/// bounded fan-out across [`tokio::task::spawn_blocking`].
///
/// # Errors
///
/// Returns an error only if no combinations are produced (an empty grid
/// along any axis).
pub async fn run_sweep(request: OptimizeRequest, bars: Vec<Bar>) -> ChronoResult<Vec<OptimizeRun>> {
    let combinations: Vec<(u32, Decimal, Decimal)> = request
        .grid_counts
        .iter()
        .flat_map(|&n| {
            request.upper_prices.iter().flat_map(move |&u| {
                request
                    .lower_prices
                    .iter()
                    .map(move |&l| (n, u, l))
            })
        })
        .collect();

    if combinations.is_empty() {
        return Err(ChronoError::invalid_request(
            "optimize sweep requires at least one grid_count/upper_price/lower_price value",
        ));
    }

    let mut handles = Vec::with_capacity(combinations.len());
    for (grid_count, upper_price, lower_price) in combinations {
        let mut config = request.base.clone();
        config.grid_count = grid_count;
        config.upper_price = upper_price;
        config.lower_price = lower_price;
        let bars = bars.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let result = engine::run(&config, &bars);
            (grid_count, upper_price, lower_price, result)
        }));
    }

    let mut runs = Vec::with_capacity(handles.len());
    for handle in handles {
        let (grid_count, upper_price, lower_price, result) = handle
            .await
            .map_err(|e| ChronoError::internal(format!("sweep task panicked: {e}")))?;
        match result {
            Ok(output) => runs.push(OptimizeRun {
                grid_count,
                upper_price,
                lower_price,
                output: Some(output),
                error: None,
            }),
            Err(err) => runs.push(OptimizeRun {
                grid_count,
                upper_price,
                lower_price,
                output: None,
                error: Some(err.to_string()),
            }),
        }
    }

    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::engine::bars_from_columns;
    use crate::domain::grid::BoundPolicy;
    use crate::domain::market_data::MarketType;
    use rust_decimal_macros::dec;

    fn base_config() -> GridConfig {
        GridConfig {
            symbol: "600000".to_string(),
            market: MarketType::AShare,
            start_date: "2024-01-01".parse().unwrap(),
            end_date: "2024-01-08".parse().unwrap(),
            upper_price: dec!(11.0),
            lower_price: dec!(10.0),
            grid_count: 2,
            total_investment: dec!(20000),
            initial_quantity: Decimal::ZERO,
            initial_per_share_cost: Decimal::ZERO,
            on_exceed_upper: BoundPolicy::Hold,
            on_fall_below_lower: BoundPolicy::Hold,
            commission_rate: Decimal::ZERO,
            stamp_duty_rate: Decimal::ZERO,
            commission_floor: Decimal::ZERO,
        }
    }

    fn scenario_bars() -> Vec<Bar> {
        let lows = [dec!(9.9), dec!(9.8), dec!(9.4), dec!(9.8), dec!(10.1), dec!(10.5), dec!(10.7), dec!(11.2)];
        let highs = [dec!(10.1), dec!(10.0), dec!(9.6), dec!(10.3), dec!(10.7), dec!(11.2), dec!(11.0), dec!(11.6)];
        let closes = [dec!(10.0), dec!(9.8), dec!(9.5), dec!(10.2), dec!(10.6), dec!(11.1), dec!(10.8), dec!(11.5)];
        bars_from_columns("2024-01-01".parse().unwrap(), &lows, &highs, &closes)
    }

    #[tokio::test]
    async fn sweep_runs_every_combination() {
        let request = OptimizeRequest {
            base: base_config(),
            grid_counts: vec![1, 2],
            upper_prices: vec![dec!(11.0)],
            lower_prices: vec![dec!(10.0)],
        };
        let runs = run_sweep(request, scenario_bars()).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.output.is_some()));
    }

    #[tokio::test]
    async fn sweep_rejects_empty_axes() {
        let request = OptimizeRequest {
            base: base_config(),
            grid_counts: vec![],
            upper_prices: vec![dec!(11.0)],
            lower_prices: vec![dec!(10.0)],
        };
        let err = run_sweep(request, scenario_bars()).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn sweep_reports_per_combination_failures_without_aborting() {
        let request = OptimizeRequest {
            base: base_config(),
            grid_counts: vec![2, 0],
            upper_prices: vec![dec!(11.0)],
            lower_prices: vec![dec!(10.0)],
        };
        let runs = run_sweep(request, scenario_bars()).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().any(|r| r.output.is_some()));
        assert!(runs.iter().any(|r| r.error.is_some()));
    }
}
