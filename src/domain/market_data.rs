//! Bar (OHLCV) and market-type types shared across the backtest and
//! validation subsystems.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market a symbol trades on, which determines lot size and stock-code
/// format (`spec.md` §3 **[EXPANSION]**).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    /// Mainland China A-share market. 100-share lots, 6-digit codes.
    #[default]
    AShare,
    /// Hong Kong market. 1-share lots, up to 5-digit codes.
    HongKong,
    /// US market. 1-share lots, alphabetic tickers.
    Us,
}

impl MarketType {
    /// The market's minimum tradable lot size.
    #[must_use]
    pub const fn lot_size(self) -> u32 {
        match self {
            Self::AShare => 100,
            Self::HongKong | Self::Us => 1,
        }
    }
}

/// A single OHLCV sample at some trade date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Trade date.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
}

impl Bar {
    /// Whether `price` fell within this bar's low/high range.
    #[must_use]
    pub fn touched(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}

/// A contiguous, date-ordered series of bars for one symbol.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series from bars, sorting by date.
    #[must_use]
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        Self { bars }
    }

    /// All bars, in date order.
    #[must_use]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Restrict to bars within `[start, end]` inclusive, preserving order.
    #[must_use]
    pub fn in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Bar> {
        self.bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect()
    }
}
