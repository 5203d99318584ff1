//! # Gemini: deterministic backtesting for a single instrument
//!
//! **Gemini** replays a trading strategy over a historical series of OHLCV bars and produces a
//! per-bar equity curve and a trade log. Runs are offline, single-threaded and fully deterministic.
//!
//! ## Core Components
//! | Component   | Description                                                                                     |
//! |-------------|-------------------------------------------------------------------------------------------------|
//! | **`Bar`** | One row of the price series: date, open, high, low, close, volume.                               |
//! | **`Position`** | A long or short trade with stop-loss, take-profit and trailing-stop rules.                  |
//! | **`Account`** | Cash, open positions, opened/closed trade logs and the equity sequence.                      |
//! | **`Backtest`** | The loop that checks exits, records equity and calls the strategy on every bar.             |
//! | **`Summary`** | Buy-and-hold versus strategy performance and trade counts.                                   |
//! | **`Draw`** | Equity curve chart with trade markers.                                                          |
//! | **`Optimizer`** | Independent parallel runs over parameter combinations.                                     |
//!
//! ## Bar Processing Order
//! 1. The account is valued at the bar close.
//! 2. For every open position the stop is checked first, then the take-profit; a trailing stop
//!    is moved only if neither fired.
//! 3. Closed positions are purged and the equity is recorded.
//! 4. The strategy is called with the account and all bars up to and including the current one.
//! 5. Positions the strategy fully closed are purged.
//!
//! ## Getting Started
//! ```rust
//! use std::sync::Arc;
//!
//! use gemini_bt::prelude::*;
//!
//! let bars = gemini_bt::utils::synthetic_bars(250, 42, 100.0);
//! let mut backtest = Backtest::new(Arc::from_iter(bars), 10_000.0).unwrap();
//!
//! let curve = backtest
//!     .run(|account, lookback| {
//!         let close = lookback.last().unwrap().close()?;
//!         if account.positions().count() == 0 && lookback.len() % 20 == 0 {
//!             account.open_position(
//!                 Entry::long(0.5, close)
//!                     .stop(close.subpercent(5.0))
//!                     .take_profit(close.addpercent(10.0)),
//!             )?;
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(curve.len(), 250);
//!
//! #[cfg(feature = "metrics")]
//! println!("{}", Summary::from(&backtest));
//! ```
//!
//! ## Error Handling
//! - Problems in the input series are warnings: they are logged and the run still proceeds.
//! - Invalid orders (size fraction, stop/target on the wrong side, closing a position that is not
//!   open) return [`errors::Error::InvalidOrder`] and abort the run.
//! - Errors returned by the strategy abort the run and are returned unchanged.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core simulation components: bars, positions, account, and backtest loop.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Utility functions: synthetic data and loaders.
pub mod utils;

/// Results summary: buy-and-hold versus strategy, trade counts, drawdown.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Strategy parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Draw the equity curve with trade markers to png or svg.
#[cfg(feature = "draws")]
pub mod draws;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::engine::*;
    pub use crate::errors::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;

    #[cfg(feature = "draws")]
    pub use crate::draws::*;
}

use std::ops::{Add, Div, Mul, Sub};

/// Trait for performing percentage-based calculations.
///
/// This trait provides methods to add, subtract, and calculate percentages
/// for numeric types, enabling common financial calculations.
pub trait PercentCalculus<Rhs = Self> {
    /// Adds a percentage to the value.
    ///
    /// ### Arguments
    /// * `rhs` - The percentage to add (e.g., 10.0 for 10%).
    fn addpercent(self, rhs: Rhs) -> Self;

    /// Subtracts a percentage from the value.
    ///
    /// ### Arguments
    /// * `rhs` - The percentage to subtract (e.g., 10.0 for 10%).
    fn subpercent(self, rhs: Rhs) -> Self;

    /// Calculates the amount a percentage of the value represents.
    fn how_many(self, percent: Self) -> Self;

    /// Percentage change (e.g. 10.0 for +10%) from the value to `new`.
    fn change(self, new: Self) -> Self;

    /// Fractional change (e.g. 0.1 for +10%) from the value to `new`.
    fn percent_change(self, new: Self) -> Self;

    /// Profit earned on the value as capital for a fractional change `pc`.
    fn profit(self, pc: Self) -> Self;
}

impl PercentCalculus for f64 {
    fn addpercent(self, percent: Self) -> Self {
        self.add(self.mul(percent.div(100.0)))
    }

    fn subpercent(self, percent: Self) -> Self {
        self.sub(self.mul(percent.div(100.0)))
    }

    fn how_many(self, percent: Self) -> Self {
        percent.mul(self.div(100.0))
    }

    fn change(self, new: Self) -> Self {
        self.percent_change(new).mul(100.0)
    }

    fn percent_change(self, new: Self) -> Self {
        new.sub(self).div(self)
    }

    fn profit(self, pc: Self) -> Self {
        self.mul(pc)
    }
}

#[cfg(test)]
mod percent {
    use super::*;

    #[test]
    fn add() {
        assert_eq!(110.0, 100.0.addpercent(10.0))
    }

    #[test]
    fn sub() {
        assert_eq!(90.0, 100.0.subpercent(10.0))
    }

    #[test]
    fn how_many() {
        assert_eq!(10.0, 100.0.how_many(10.0))
    }

    #[test]
    fn change() {
        assert_eq!(10.0, 100.0.change(110.0))
    }

    #[test]
    fn percent_change_and_profit() {
        let pc = 10_000.0.percent_change(9_000.0);
        assert_eq!(pc, -0.1);
        assert_eq!(10_000.0.profit(pc), -1_000.0);
    }
}
