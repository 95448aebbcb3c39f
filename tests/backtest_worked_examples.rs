//! Integration tests running the backtest engine's worked examples
//! (`spec.md` §8) through the HTTP surface rather than calling the engine
//! directly, so the DTO (de)serialization boundary is exercised too.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tower::ServiceExt;

use chronoretrace_core::backtest::engine::bars_from_columns;
use chronoretrace_core::cache::{LocalCache, MultiTierCache, WarmingController};
use chronoretrace_core::domain::grid::{BoundPolicy, GridConfig};
use chronoretrace_core::domain::market_data::{Bar, MarketType};
use chronoretrace_core::infrastructure::http::{
    AppState, BacktestGridRequest, BacktestOptimizeRequest, create_router,
};
use chronoretrace_core::monitor::PerformanceMonitor;
use chronoretrace_core::realtime::ConnectionManager;

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
    let lows = [
        dec!(9.9), dec!(9.8), dec!(9.4), dec!(9.8),
        dec!(10.1), dec!(10.5), dec!(10.7), dec!(11.2),
    ];
    let highs = [
        dec!(10.1), dec!(10.0), dec!(9.6), dec!(10.3),
        dec!(10.7), dec!(11.2), dec!(11.0), dec!(11.6),
    ];
    let closes = [
        dec!(10.0), dec!(9.8), dec!(9.5), dec!(10.2),
        dec!(10.6), dec!(11.1), dec!(10.8), dec!(11.5),
    ];
    bars_from_columns("2024-01-01".parse().unwrap(), &lows, &highs, &closes)
}

/// A state without a reachable remote tier; these tests never touch the
/// cache surface, only `/backtest/*`.
fn build_state() -> AppState {
    struct Unreachable;
    #[async_trait::async_trait]
    impl chronoretrace_core::cache::RemoteCachePort for Unreachable {
        async fn get(&self, _key: &str) -> chronoretrace_core::error::ChronoResult<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn set(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> chronoretrace_core::error::ChronoResult<()> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> chronoretrace_core::error::ChronoResult<()> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> chronoretrace_core::error::ChronoResult<bool> {
            Ok(false)
        }
        async fn delete_pattern(&self, _pattern: &str) -> chronoretrace_core::error::ChronoResult<u64> {
            Ok(0)
        }
        async fn ping(&self) -> chronoretrace_core::error::ChronoResult<bool> {
            Ok(false)
        }
        async fn info(&self) -> chronoretrace_core::error::ChronoResult<chronoretrace_core::cache::RemoteInfo> {
            Ok(chronoretrace_core::cache::RemoteInfo {
                reachable: false,
                connected_clients: None,
                used_memory_bytes: None,
            })
        }
    }

    let monitor = Arc::new(PerformanceMonitor::new(16));
    let cache = Arc::new(MultiTierCache::new(
        Arc::new(LocalCache::new(10)),
        Arc::new(Unreachable),
        Arc::clone(&monitor),
        "backtest_test",
    ));
    AppState {
        warming: Arc::new(WarmingController::new(Arc::clone(&cache), 0.5)),
        cache,
        monitor,
        connections: Arc::new(ConnectionManager::new(16, Duration::from_secs(60))),
        stale_threshold: Duration::from_secs(5),
        version: "test".to_string(),
    }
}

#[tokio::test]
async fn grid_endpoint_matches_no_fee_worked_example() {
    let app = create_router(build_state());
    let request = BacktestGridRequest {
        config: base_config(),
        bars: scenario_bars(),
    };
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/backtest/grid")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: chronoretrace_core::infrastructure::http::BacktestGridResponse =
        serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.result.transactions.len(), 4);
    assert_eq!(body.result.total_pnl, dec!(950.0));
    assert_eq!(body.market_type, MarketType::AShare);
}

#[tokio::test]
async fn grid_endpoint_matches_fee_aware_worked_example() {
    let app = create_router(build_state());
    let mut config = base_config();
    config.grid_count = 1;
    config.commission_rate = dec!(0.001);
    config.commission_floor = dec!(5);
    config.stamp_duty_rate = dec!(0.001);

    let request = BacktestGridRequest {
        config,
        bars: scenario_bars(),
    };
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/backtest/grid")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: chronoretrace_core::infrastructure::http::BacktestGridResponse =
        serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.result.transactions.len(), 2);
    assert_eq!(body.result.total_pnl, dec!(1839.2000));
    assert_eq!(body.result.final_shares, Decimal::ZERO);
}

#[tokio::test]
async fn grid_endpoint_rejects_out_of_range_dates_with_404() {
    let app = create_router(build_state());
    let mut config = base_config();
    config.start_date = "2030-01-01".parse().unwrap();
    config.end_date = "2030-01-08".parse().unwrap();

    let request = BacktestGridRequest {
        config,
        bars: scenario_bars(),
    };
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/backtest/grid")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn optimize_endpoint_runs_every_combination() {
    let app = create_router(build_state());
    let request = BacktestOptimizeRequest {
        optimize: chronoretrace_core::backtest::optimize::OptimizeRequest {
            base: base_config(),
            grid_counts: vec![1, 2],
            upper_prices: vec![dec!(11.0)],
            lower_prices: vec![dec!(10.0)],
        },
        bars: scenario_bars(),
    };
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/backtest/grid/optimize")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: chronoretrace_core::infrastructure::http::BacktestOptimizeResponse =
        serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.runs.len(), 2);
    assert!(body.runs.iter().all(|r| r.output.is_some()));
}
