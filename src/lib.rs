//! ChronoRetrace Core — the deterministic backend for market-data caching,
//! real-time fan-out, and grid-trading backtests.
//!
//! See `DESIGN.md` for how each module grounds on the reference stack this
//! crate was built from.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backtest;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod monitor;
pub mod quality;
pub mod realtime;
pub mod telemetry;

pub use error::{ChronoError, ChronoResult, ErrorCode};
