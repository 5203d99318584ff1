//! Core simulation components.
//!
//! This module provides the fundamental types for backtesting:
//! - `Bar`: one OHLCV row of the price series.
//! - `Position`: a trade with stop-loss, take-profit and trailing-stop rules.
//! - `Account`: cash, open positions, trade logs and the equity sequence.
//! - `Backtest`: the bar-by-bar loop driving a strategy callback.
//! - `EquityCurve`: the per-bar output of a run.

mod account;
mod bar;
mod bts;
mod curve;
mod position;

pub use account::*;
pub use bar::*;
pub use bts::*;
pub use curve::*;
pub use position::*;
