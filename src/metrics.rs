//! Results summary of a backtest.
//!
//! [`Summary`] compares the strategy with buying and holding the instrument over the same bars and
//! counts the trades by direction and event: longs and shorts opened, sells (long closes) and covers
//! (short closes). Partial closes count as one event each.

use std::fmt;

use crate::PercentCalculus;
use crate::engine::*;
use crate::errors::{Error, Result};

/// Performance summary of the last run of a [`Backtest`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    initial_capital: f64,
    first_price: f64,
    final_price: f64,
    final_value: f64,
    longs: usize,
    sells: usize,
    shorts: usize,
    covers: usize,
    equity: Vec<f64>,
}

impl From<&Backtest> for Summary {
    /// Builds the summary. When the first open or the last close is missing, prices are NaN and the
    /// final value is the last recorded equity.
    fn from(value: &Backtest) -> Self {
        match Self::try_from(value) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!("incomplete summary: {err}");
                let final_value = value.equity().last().copied().unwrap_or(value.initial_capital());
                Self::new(value, f64::NAN, f64::NAN, final_value)
            }
        }
    }
}

impl TryFrom<&Backtest> for Summary {
    type Error = Error;

    fn try_from(value: &Backtest) -> Result<Self> {
        let first = value.bars().next().ok_or(Error::Msg("No bars to summarize".to_string()))?;
        let last = value.bars().last().ok_or(Error::Msg("No bars to summarize".to_string()))?;
        let first_price = first.open()?;
        let final_price = last.close()?;
        Ok(Self::new(value, first_price, final_price, value.total_value(final_price)))
    }
}

fn count(trades: &[Trade], side: PositionSide) -> usize {
    trades.iter().filter(|t| t.side() == side).count()
}

impl Summary {
    fn new(backtest: &Backtest, first_price: f64, final_price: f64, final_value: f64) -> Self {
        Self {
            first_price,
            final_price,
            final_value,
            initial_capital: backtest.initial_capital(),
            longs: count(backtest.opened_trades(), PositionSide::Long),
            sells: count(backtest.closed_trades(), PositionSide::Long),
            shorts: count(backtest.opened_trades(), PositionSide::Short),
            covers: count(backtest.closed_trades(), PositionSide::Short),
            equity: backtest.equity().to_vec(),
        }
    }

    /// Returns the starting cash.
    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Account value at the final close, open positions marked to market.
    pub fn final_value(&self) -> f64 {
        self.final_value
    }

    /// Fractional change from the first open to the final close.
    pub fn buy_and_hold(&self) -> f64 {
        self.first_price.percent_change(self.final_price)
    }

    /// Fractional change of the account from the initial capital to the final value.
    pub fn strategy(&self) -> f64 {
        self.initial_capital.percent_change(self.final_value)
    }

    /// Long positions opened.
    pub fn longs(&self) -> usize {
        self.longs
    }

    /// Long close events.
    pub fn sells(&self) -> usize {
        self.sells
    }

    /// Short positions opened.
    pub fn shorts(&self) -> usize {
        self.shorts
    }

    /// Short close events.
    pub fn covers(&self) -> usize {
        self.covers
    }

    /// All open and close events.
    pub fn total_trades(&self) -> usize {
        self.longs + self.sells + self.shorts + self.covers
    }

    /// Largest peak-to-trough decline of the recorded equity, in percent.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial_capital;
        let mut max_drawdown = 0.0;
        for &value in &self.equity {
            if value > peak {
                peak = value;
            }
            let drawdown = (peak - value) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
        max_drawdown * 100.0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buy_and_hold = self.buy_and_hold();
        let strategy = self.strategy();
        writeln!(f, "-------------- Results ----------------")?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "Buy and Hold : {:.2}%", buy_and_hold * 100.0)?;
        writeln!(f, "Net Profit   : {:.2}", self.initial_capital.profit(buy_and_hold))?;
        writeln!(f, "Strategy     : {:.2}%", strategy * 100.0)?;
        writeln!(f, "Net Profit   : {:.2}", self.initial_capital.profit(strategy))?;
        writeln!(f, "Max Drawdown : {:.2}%", self.max_drawdown())?;
        writeln!(f, "Longs        : {}", self.longs)?;
        writeln!(f, "Sells        : {}", self.sells)?;
        writeln!(f, "Shorts       : {}", self.shorts)?;
        writeln!(f, "Covers       : {}", self.covers)?;
        writeln!(f, "--------------------")?;
        writeln!(f, "Total Trades : {}", self.total_trades())?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "---------------------------------------")
    }
}
