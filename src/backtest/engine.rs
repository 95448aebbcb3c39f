//! Grid-trading simulation engine (`spec.md` §4.8, Backtest Engine (I)).
//!
//! The engine is a pure function of (bar series, grid configuration). It
//! performs no I/O and relies on no wall-clock or random state, so identical
//! inputs always produce a byte-identical output.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::commission::{buy_total_cost, sell_fees};
use crate::domain::grid::{
    BoundPolicy, EquityPoint, GridConfig, GridSlot, Portfolio, SlotStatus, Transaction,
    TransactionSide,
};
use crate::domain::market_data::Bar;
use crate::error::{ChronoError, ChronoResult};

/// Output of a single grid-backtest run (`spec.md` §3, §4.8 Finalization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOutput {
    /// Transaction log, in execution order.
    pub transactions: Vec<Transaction>,
    /// Per-bar equity curve (strategy vs buy-and-hold benchmark).
    pub equity_curve: Vec<EquityPoint>,
    /// Ending cash balance.
    pub final_cash: Decimal,
    /// Ending share pool.
    pub final_shares: Decimal,
    /// Average cost basis of the ending share pool; zero if flat.
    pub final_avg_holding_cost: Decimal,
    /// `final_cash + final_shares * last_close`.
    pub final_portfolio_value: Decimal,
    /// `final_portfolio_value - initial_portfolio_value`.
    pub total_pnl: Decimal,
    /// `total_pnl / initial_portfolio_value`.
    pub total_return_rate: Decimal,
    /// Annualized return; zero for runs shorter than 30 days.
    pub annualized_return_rate: Decimal,
    /// `winning_trades / sell_trades`, zero if no sells occurred.
    pub win_rate: Decimal,
    /// Largest peak-to-trough drawdown observed, as a fraction of peak equity.
    pub max_drawdown: Decimal,
    /// Count of completed sell fills.
    pub sell_trades: u64,
    /// Count of sells with positive realized P&L.
    pub winning_trades: u64,
    /// True if the run terminated early on a bound-exit liquidation.
    pub terminated_early: bool,
}

/// Run the grid strategy described by `config` over `bars`.
///
/// # Errors
///
/// Returns `INVALID_CONFIG` if `config` violates an invariant (`spec.md`
/// §4.8), or `NO_DATA_IN_RANGE` if no bar falls within
/// `[config.start_date, config.end_date]`.
pub fn run(config: &GridConfig, bars: &[Bar]) -> ChronoResult<BacktestOutput> {
    config.validate()?;

    let in_range: Vec<&Bar> = bars
        .iter()
        .filter(|b| b.date >= config.start_date && b.date <= config.end_date)
        .collect();
    if in_range.is_empty() {
        return Err(ChronoError::no_data_in_range());
    }

    let lot = Decimal::from(config.market.lot_size());
    let mut slots = GridSlot::build_slots(config);
    let cash_per_grid = config.cash_per_grid();

    let initial_cost_basis = config.initial_quantity * config.initial_per_share_cost;
    let initial_portfolio_value = config.total_investment + initial_cost_basis;
    let benchmark_shares = initial_portfolio_value / in_range[0].open;

    let mut portfolio = Portfolio {
        cash: config.total_investment,
        shares: config.initial_quantity,
        transactions: Vec::new(),
        equity_curve: Vec::new(),
        peak_equity: initial_portfolio_value,
        max_drawdown: Decimal::ZERO,
        sell_trades: 0,
        winning_trades: 0,
    };
    let mut holding_cost_total = initial_cost_basis;
    let mut terminated_early = false;
    let mut last_close = in_range[0].close;

    'bars: for bar in &in_range {
        last_close = bar.close;
        let mut traded = false;

        // 1. Buy pass, ascending slot order.
        for slot in &mut slots {
            if traded {
                break;
            }
            if slot.status != SlotStatus::Open || bar.low > slot.buy_price {
                continue;
            }
            let buy_price = slot.buy_price;
            let candidate = cash_per_grid / buy_price;
            let mut qty = (candidate / lot).floor() * lot;
            let mut total_cost = buy_total_cost(
                qty,
                buy_price,
                config.commission_rate,
                config.commission_floor,
            );
            while qty > Decimal::ZERO && total_cost > cash_per_grid {
                qty -= lot;
                total_cost = buy_total_cost(
                    qty,
                    buy_price,
                    config.commission_rate,
                    config.commission_floor,
                );
            }
            if qty > Decimal::ZERO && portfolio.cash >= total_cost {
                portfolio.cash -= total_cost;
                portfolio.shares += qty;
                holding_cost_total += total_cost;
                slot.status = SlotStatus::Bought;
                slot.bought_quantity = qty;
                slot.cost_basis = total_cost;
                portfolio.transactions.push(Transaction {
                    date: bar.date,
                    slot_index: slot.index,
                    side: TransactionSide::Buy,
                    price: buy_price,
                    quantity: qty,
                    fees: total_cost - qty * buy_price,
                    realized_pnl: None,
                });
                debug!(slot = slot.index, qty = %qty, price = %buy_price, "grid buy");
                traded = true;
            }
        }

        // 2. Otherwise, sell pass, ascending slot order.
        if !traded {
            for slot in &mut slots {
                if traded {
                    break;
                }
                if slot.status != SlotStatus::Bought
                    || bar.high < slot.sell_price
                    || portfolio.shares < slot.bought_quantity
                {
                    continue;
                }
                let qty = slot.bought_quantity;
                let sell_price = slot.sell_price;
                let gross = qty * sell_price;
                let fees = sell_fees(
                    qty,
                    sell_price,
                    config.commission_rate,
                    config.commission_floor,
                    config.stamp_duty_rate,
                );
                let net = gross - fees;
                let pnl = net - slot.cost_basis;

                portfolio.cash += net;
                portfolio.shares -= qty;
                holding_cost_total -= slot.cost_basis;
                portfolio.sell_trades += 1;
                if pnl > Decimal::ZERO {
                    portfolio.winning_trades += 1;
                }
                portfolio.transactions.push(Transaction {
                    date: bar.date,
                    slot_index: slot.index,
                    side: TransactionSide::Sell,
                    price: sell_price,
                    quantity: qty,
                    fees,
                    realized_pnl: Some(pnl),
                });
                debug!(slot = slot.index, qty = %qty, price = %sell_price, pnl = %pnl, "grid sell");
                Portfolio::close_slot(slot);
                traded = true;
            }
        }

        // 3. Drawdown bookkeeping.
        let portfolio_value = portfolio.cash + portfolio.shares * bar.close;
        portfolio.update_drawdown(portfolio_value);

        // 4. Equity curve point.
        portfolio.equity_curve.push(EquityPoint {
            date: bar.date,
            portfolio_value,
            benchmark_value: benchmark_shares * bar.close,
        });

        // 5. Bound-exit liquidation policies.
        let exceed_upper = config.on_exceed_upper == BoundPolicy::SellAll
            && bar.close > config.upper_price
            && portfolio.shares > Decimal::ZERO;
        let fall_below_lower = config.on_fall_below_lower == BoundPolicy::SellAll
            && bar.close < config.lower_price
            && portfolio.shares > Decimal::ZERO;

        if exceed_upper || fall_below_lower {
            let qty = portfolio.shares;
            let gross = qty * bar.close;
            let fees = sell_fees(
                qty,
                bar.close,
                config.commission_rate,
                config.commission_floor,
                config.stamp_duty_rate,
            );
            let net = gross - fees;
            portfolio.cash += net;
            portfolio.shares = Decimal::ZERO;
            portfolio.transactions.push(Transaction {
                date: bar.date,
                slot_index: u32::MAX,
                side: TransactionSide::Sell,
                price: bar.close,
                quantity: qty,
                fees,
                realized_pnl: None,
            });
            terminated_early = true;
            break 'bars;
        }
    }

    let final_portfolio_value = portfolio.cash + portfolio.shares * last_close;
    let total_pnl = final_portfolio_value - initial_portfolio_value;
    let total_return_rate = total_pnl / initial_portfolio_value;

    let span_days = (config.end_date - config.start_date).num_days();
    let years = span_days as f64 / 365.0;
    let annualized_return_rate = if years > 30.0 / 365.0 {
        let base = 1.0 + total_return_rate.to_f64().unwrap_or(0.0);
        let annualized = base.powf(1.0 / years) - 1.0;
        Decimal::from_f64_retain(annualized).unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    let win_rate = if portfolio.sell_trades > 0 {
        Decimal::from(portfolio.winning_trades) / Decimal::from(portfolio.sell_trades)
    } else {
        Decimal::ZERO
    };

    let final_avg_holding_cost = if portfolio.shares > Decimal::ZERO {
        holding_cost_total / portfolio.shares
    } else {
        Decimal::ZERO
    };

    Ok(BacktestOutput {
        transactions: portfolio.transactions,
        equity_curve: portfolio.equity_curve,
        final_cash: portfolio.cash,
        final_shares: portfolio.shares,
        final_avg_holding_cost,
        final_portfolio_value,
        total_pnl,
        total_return_rate,
        annualized_return_rate,
        win_rate,
        max_drawdown: portfolio.max_drawdown,
        sell_trades: portfolio.sell_trades,
        winning_trades: portfolio.winning_trades,
        terminated_early,
    })
}

/// Helper used only by tests/callers that already have a date axis; builds
/// a `Bar` slice from parallel OHLCV columns starting at `start`.
#[must_use]
pub fn bars_from_columns(
    start: NaiveDate,
    lows: &[Decimal],
    highs: &[Decimal],
    closes: &[Decimal],
) -> Vec<Bar> {
    lows.iter()
        .zip(highs)
        .zip(closes)
        .enumerate()
        .map(|(i, ((&low, &high), &close))| Bar {
            date: start + chrono::Duration::days(i as i64),
            open: low,
            high,
            low,
            close,
            volume: Decimal::ZERO,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
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
        let lows = [
            dec!(9.9),
            dec!(9.8),
            dec!(9.4),
            dec!(9.8),
            dec!(10.1),
            dec!(10.5),
            dec!(10.7),
            dec!(11.2),
        ];
        let highs = [
            dec!(10.1),
            dec!(10.0),
            dec!(9.6),
            dec!(10.3),
            dec!(10.7),
            dec!(11.2),
            dec!(11.0),
            dec!(11.6),
        ];
        let closes = [
            dec!(10.0),
            dec!(9.8),
            dec!(9.5),
            dec!(10.2),
            dec!(10.6),
            dec!(11.1),
            dec!(10.8),
            dec!(11.5),
        ];
        bars_from_columns("2024-01-01".parse().unwrap(), &lows, &highs, &closes)
    }

    #[test]
    fn grid_backtest_no_fees_matches_worked_example() {
        let config = base_config();
        let out = run(&config, &scenario_bars()).unwrap();
        assert_eq!(out.transactions.len(), 4);
        assert_eq!(out.total_pnl, dec!(950.0));
    }

    #[test]
    fn grid_backtest_with_fees_matches_worked_example() {
        let mut config = base_config();
        config.grid_count = 1;
        config.commission_rate = dec!(0.001);
        config.commission_floor = dec!(5);
        config.stamp_duty_rate = dec!(0.001);
        let out = run(&config, &scenario_bars()).unwrap();
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.total_pnl, dec!(1839.2000));
        assert_eq!(out.final_shares, Decimal::ZERO);
    }

    #[test]
    fn bound_exit_liquidation_terminates_run() {
        // grid_count=2: slot0 buy=10.0/sell=10.5, slot1 buy=10.5/sell=11.0.
        // Day 0 fills slot0. Day 1's low fills slot1 (consuming the day's
        // single trade) while its close still exceeds upper_price, so the
        // bound-exit policy forces a full liquidation on day 1 without a
        // normal sell ever touching slot0's matured sell price.
        let mut config = base_config();
        config.on_exceed_upper = BoundPolicy::SellAll;
        let bars = vec![
            Bar {
                date: "2024-01-01".parse().unwrap(),
                open: dec!(10.0),
                high: dec!(10.1),
                low: dec!(9.9),
                close: dec!(10.0),
                volume: Decimal::ZERO,
            },
            Bar {
                date: "2024-01-02".parse().unwrap(),
                open: dec!(10.4),
                high: dec!(11.6),
                low: dec!(10.3),
                close: dec!(11.5),
                volume: Decimal::ZERO,
            },
        ];
        let out = run(&config, &bars).unwrap();
        assert!(out.terminated_early);
        assert_eq!(out.transactions.len(), 3);
        let last = out.transactions.last().unwrap();
        assert_eq!(last.side, TransactionSide::Sell);
        assert_eq!(last.quantity, dec!(1900));
        assert_eq!(last.price, dec!(11.5));
        assert_eq!(out.final_shares, Decimal::ZERO);
        assert_eq!(out.equity_curve.len(), 2);
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut config = base_config();
        config.start_date = "2030-01-01".parse().unwrap();
        config.end_date = "2030-01-08".parse().unwrap();
        let err = run(&config, &scenario_bars()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NoDataInRange);
    }

    #[test]
    fn a_share_buys_are_always_lot_multiples() {
        let config = base_config();
        let out = run(&config, &scenario_bars()).unwrap();
        for tx in out.transactions.iter().filter(|t| t.side == TransactionSide::Buy) {
            assert_eq!(tx.quantity % dec!(100), Decimal::ZERO);
        }
    }

    #[test]
    fn determinism_repeated_runs_are_identical() {
        let config = base_config();
        let bars = scenario_bars();
        let first = run(&config, &bars).unwrap();
        let second = run(&config, &bars).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
