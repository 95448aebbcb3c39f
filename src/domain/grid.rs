//! Grid-trading strategy configuration and runtime state (`spec.md` §3, §4.8).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market_data::MarketType;
use crate::error::{ChronoError, ChronoResult};

/// Policy applied when the bar's close crosses a grid bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundPolicy {
    /// Do nothing; keep simulating.
    #[default]
    Hold,
    /// Liquidate the entire share pool at the close and terminate the run.
    SellAll,
}

/// Grid-trading strategy configuration (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Symbol under simulation.
    pub symbol: String,
    /// Market the symbol trades on, determines lot size.
    #[serde(default)]
    pub market: MarketType,
    /// Inclusive start date.
    pub start_date: NaiveDate,
    /// Inclusive end date.
    pub end_date: NaiveDate,
    /// Upper grid bound.
    pub upper_price: Decimal,
    /// Lower grid bound.
    pub lower_price: Decimal,
    /// Number of grid slots, N ≥ 1.
    pub grid_count: u32,
    /// Total starting cash.
    pub total_investment: Decimal,
    /// Pre-existing holding quantity, if any.
    #[serde(default)]
    pub initial_quantity: Decimal,
    /// Per-share cost basis of the initial holding.
    #[serde(default)]
    pub initial_per_share_cost: Decimal,
    /// Policy when price exceeds `upper_price`.
    #[serde(default)]
    pub on_exceed_upper: BoundPolicy,
    /// Policy when price falls below `lower_price`.
    #[serde(default)]
    pub on_fall_below_lower: BoundPolicy,
    /// Commission rate applied to both buys and sells.
    pub commission_rate: Decimal,
    /// Stamp duty rate, applied to sells only.
    pub stamp_duty_rate: Decimal,
    /// Minimum commission charged per trade.
    pub commission_floor: Decimal,
}

impl GridConfig {
    /// Validate the invariants from `spec.md` §3/§4.8, tagging the offending
    /// field on failure.
    pub fn validate(&self) -> ChronoResult<()> {
        if self.upper_price <= self.lower_price {
            return Err(ChronoError::invalid_config(
                "upper_price",
                "upper_price must be greater than lower_price",
            ));
        }
        if self.grid_count < 1 {
            return Err(ChronoError::invalid_config(
                "grid_count",
                "grid_count must be at least 1",
            ));
        }
        if self.total_investment <= Decimal::ZERO {
            return Err(ChronoError::invalid_config(
                "total_investment",
                "total_investment must be positive",
            ));
        }
        if self.start_date > self.end_date {
            return Err(ChronoError::invalid_config(
                "start_date",
                "start_date must not be after end_date",
            ));
        }
        Ok(())
    }

    /// Grid step size `(upper - lower) / N`.
    #[must_use]
    pub fn step(&self) -> Decimal {
        (self.upper_price - self.lower_price) / Decimal::from(self.grid_count)
    }

    /// Buy price (lower edge) of grid slot `i`.
    #[must_use]
    pub fn buy_price(&self, i: u32) -> Decimal {
        self.lower_price + self.step() * Decimal::from(i)
    }

    /// Sell price (upper edge) of grid slot `i`.
    #[must_use]
    pub fn sell_price(&self, i: u32) -> Decimal {
        self.lower_price + self.step() * Decimal::from(i + 1)
    }

    /// Cash allocated per grid slot.
    #[must_use]
    pub fn cash_per_grid(&self) -> Decimal {
        self.total_investment / Decimal::from(self.grid_count)
    }
}

/// Status of a single grid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// No outstanding buy in this slot.
    Open,
    /// Slot holds an outstanding buy awaiting a matching sell.
    Bought,
}

/// Runtime state of one of the N grid slots (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSlot {
    /// Index within the grid, 0-based.
    pub index: u32,
    /// Current status.
    pub status: SlotStatus,
    /// Buy price (lower edge).
    pub buy_price: Decimal,
    /// Sell price (upper edge).
    pub sell_price: Decimal,
    /// Quantity bought; zero while open.
    pub bought_quantity: Decimal,
    /// Total cost recorded on fill (quantity * price + fees).
    pub cost_basis: Decimal,
}

impl GridSlot {
    /// Construct the N slots for a validated configuration.
    #[must_use]
    pub fn build_slots(config: &GridConfig) -> Vec<Self> {
        (0..config.grid_count)
            .map(|i| Self {
                index: i,
                status: SlotStatus::Open,
                buy_price: config.buy_price(i),
                sell_price: config.sell_price(i),
                bought_quantity: Decimal::ZERO,
                cost_basis: Decimal::ZERO,
            })
            .collect()
    }

    fn reset(&mut self) {
        self.status = SlotStatus::Open;
        self.bought_quantity = Decimal::ZERO;
        self.cost_basis = Decimal::ZERO;
    }
}

/// Transaction side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionSide {
    /// Buy fill.
    Buy,
    /// Sell fill.
    Sell,
}

/// One executed fill in the backtest's transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Bar date the fill occurred on.
    pub date: NaiveDate,
    /// Grid slot index involved.
    pub slot_index: u32,
    /// Buy or sell.
    pub side: TransactionSide,
    /// Fill price.
    pub price: Decimal,
    /// Fill quantity.
    pub quantity: Decimal,
    /// Total fees charged (commission + stamp duty where applicable).
    pub fees: Decimal,
    /// Realized P&L; only meaningful for sells.
    pub realized_pnl: Option<Decimal>,
}

/// Mutable portfolio state threaded through a backtest run (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct Portfolio {
    /// Cash balance.
    pub cash: Decimal,
    /// Unified share pool (pre-existing + grid-acquired, non-separable).
    pub shares: Decimal,
    /// Executed transaction log.
    pub transactions: Vec<Transaction>,
    /// Per-bar equity curve: (date, portfolio value, benchmark value).
    pub equity_curve: Vec<EquityPoint>,
    /// Highest portfolio value observed so far.
    pub peak_equity: Decimal,
    /// Largest drawdown observed so far, as a fraction of peak equity.
    pub max_drawdown: Decimal,
    /// Total number of completed sells.
    pub sell_trades: u64,
    /// Number of sells with positive realized P&L.
    pub winning_trades: u64,
}

/// One point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Bar date.
    pub date: NaiveDate,
    /// Portfolio value (cash + shares * close).
    pub portfolio_value: Decimal,
    /// Buy-and-hold benchmark value for the same date.
    pub benchmark_value: Decimal,
}

impl Portfolio {
    /// Record a slot reset alongside a sell fill.
    pub fn close_slot(slot: &mut GridSlot) {
        slot.reset();
    }

    /// Update peak equity and max drawdown from the current portfolio value.
    pub fn update_drawdown(&mut self, portfolio_value: Decimal) {
        if portfolio_value > self.peak_equity {
            self.peak_equity = portfolio_value;
        }
        if self.peak_equity > Decimal::ZERO {
            let drawdown = (self.peak_equity - portfolio_value) / self.peak_equity;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }
}
