use std::collections::{VecDeque, vec_deque::Iter};

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Position, PositionSide, Trade};
use crate::errors::{OrderError, Result};

/// An open request for [`Account::open_position`].
///
/// ```rust
/// use gemini_bt::prelude::*;
///
/// // commit half of the cash to a long at 100, stop at 95 trailing, target at 120
/// let entry = Entry::long(0.5, 100.0).stop(95.0).take_profit(120.0).trailing();
/// assert_eq!(entry.side(), PositionSide::Long);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    side: PositionSide,
    size_fraction: f64,
    price: f64,
    date: Option<DateTime<Utc>>,
    stop: Option<f64>,
    take_profit: Option<f64>,
    exit_price: Option<f64>,
    trailing_stop: bool,
}

impl Entry {
    /// Creates an entry committing `size_fraction` of the available cash at `price`.
    pub fn new(side: PositionSide, size_fraction: f64, price: f64) -> Self {
        Self {
            side,
            size_fraction,
            price,
            date: None,
            stop: None,
            take_profit: None,
            exit_price: None,
            trailing_stop: false,
        }
    }

    /// Long entry.
    pub fn long(size_fraction: f64, price: f64) -> Self {
        Self::new(PositionSide::Long, size_fraction, price)
    }

    /// Short entry.
    pub fn short(size_fraction: f64, price: f64) -> Self {
        Self::new(PositionSide::Short, size_fraction, price)
    }

    /// Dates the entry. Defaults to the account's current date.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the stop-loss price.
    pub fn stop(mut self, price: f64) -> Self {
        self.stop = Some(price);
        self
    }

    /// Sets the take-profit price.
    pub fn take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    /// Sets the fill used when the take-profit fires. Defaults to the take-profit price.
    pub fn exit_price(mut self, price: f64) -> Self {
        self.exit_price = Some(price);
        self
    }

    /// Makes the stop trail favorable closes.
    pub fn trailing(mut self) -> Self {
        self.trailing_stop = true;
        self
    }

    /// Returns the direction.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    fn check(&self) -> std::result::Result<(), OrderError> {
        if !(self.size_fraction > 0.0 && self.size_fraction <= 1.0) {
            return Err(OrderError::SizeFraction(self.size_fraction));
        }
        check_price(self.price)?;
        if let Some(exit_price) = self.exit_price {
            check_price(exit_price)?;
        }
        if let Some(stop) = self.stop {
            check_stop(self.side, self.price, stop)?;
        }
        if let Some(take_profit) = self.take_profit {
            let valid = match self.side {
                PositionSide::Long => take_profit > self.price,
                PositionSide::Short => take_profit < self.price,
            };
            if !valid {
                return Err(OrderError::TakeProfitOrdering {
                    side: self.side,
                    entry: self.price,
                    take_profit,
                });
            }
        }
        if self.trailing_stop && self.stop.is_none() {
            return Err(OrderError::TrailingWithoutStop);
        }
        Ok(())
    }
}

fn check_price(price: f64) -> std::result::Result<(), OrderError> {
    if price <= 0.0 || !price.is_finite() {
        return Err(OrderError::Price(price));
    }
    Ok(())
}

fn check_stop(side: PositionSide, entry: f64, stop: f64) -> std::result::Result<(), OrderError> {
    let valid = match side {
        PositionSide::Long => stop < entry,
        PositionSide::Short => stop > entry,
    };
    if !valid || !stop.is_finite() {
        return Err(OrderError::StopOrdering { side, entry, stop });
    }
    Ok(())
}

/// Cash, open positions and the trade and equity history of one backtest run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Account {
    next_id: u32,
    initial_capital: f64,
    cash: f64,
    positions: VecDeque<Position>,
    opened_trades: Vec<Trade>,
    closed_trades: Vec<Trade>,
    equity: Vec<f64>,
    current_date: Option<DateTime<Utc>>,
}

impl Account {
    pub(crate) fn new(initial_capital: f64) -> Self {
        Self {
            next_id: 0,
            initial_capital,
            cash: initial_capital,
            positions: VecDeque::new(),
            opened_trades: Vec::new(),
            closed_trades: Vec::new(),
            equity: Vec::new(),
            current_date: None,
        }
    }

    /// Returns the starting cash.
    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Returns the uninvested cash.
    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Returns an iterator over the open positions, oldest first.
    pub fn positions(&self) -> Iter<'_, Position> {
        self.positions.iter()
    }

    /// Returns one snapshot per opened position.
    pub fn opened_trades(&self) -> &[Trade] {
        &self.opened_trades
    }

    /// Returns one snapshot per full or partial close.
    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    /// Returns the total value recorded at each processed bar.
    pub fn equity(&self) -> &[f64] {
        &self.equity
    }

    /// Returns the date of the last processed bar.
    pub fn current_date(&self) -> Option<DateTime<Utc>> {
        self.current_date
    }

    /// Cash plus the mark-to-market value of every open position at `price`.
    pub fn total_value(&self, price: f64) -> f64 {
        self.cash + self.positions.iter().map(|p| p.mark_to_market(price)).sum::<f64>()
    }

    /// Opens a position, committing a fraction of the available cash.
    ///
    /// ### Returns
    /// A snapshot of the new position, or [`Error::InvalidOrder`](crate::errors::Error::InvalidOrder).
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use gemini_bt::prelude::*;
    /// use chrono::DateTime;
    ///
    /// let bar = Bar::from((DateTime::default(), 100.0, 101.0, 99.0, 100.0, 1.0));
    /// let mut bt = Backtest::new(Arc::from_iter(vec![bar]), 10_000.0).unwrap();
    /// bt.run(|account, lookback| {
    ///     let close = lookback.last().unwrap().close()?;
    ///     let position = account.open_position(Entry::long(1.0, close).stop(90.0))?;
    ///     assert_eq!(position.quantity(), 100.0);
    ///     Ok(())
    /// })
    /// .unwrap();
    /// ```
    pub fn open_position(&mut self, entry: Entry) -> Result<Position> {
        entry.check()?;
        let date = entry.date.or(self.current_date).ok_or(OrderError::UnknownDate)?;
        if self.cash <= 0.0 {
            return Err(OrderError::InsufficientFunds(self.cash).into());
        }

        let committed = self.cash * entry.size_fraction;
        let position = Position::new(
            self.next_id,
            entry.side,
            entry.price,
            date,
            committed / entry.price,
            entry.stop,
            entry.take_profit,
            entry.trailing_stop,
            entry.exit_price,
        );
        self.next_id += 1;
        self.cash -= committed;
        self.positions.push_back(position);
        self.opened_trades.push(Trade::new(date, position, position.quantity(), entry.price));
        debug!(id = position.id(), side = ?entry.side, price = entry.price, committed, "position opened");
        Ok(position)
    }

    /// Closes `fraction` of the position's original quantity at `price`.
    ///
    /// A fraction of `1.0` closes whatever remains. The closed position stays in the open set with a
    /// zero quantity until [`Account::purge_positions`] runs.
    ///
    /// ### Returns
    /// The realized profit of the closed units.
    pub fn close_position(&mut self, position: &Position, fraction: f64, price: f64) -> Result<f64> {
        let date = self.current_date.unwrap_or(position.entry_date());
        self.close_at(position, fraction, price, date)
    }

    pub(crate) fn close_at(
        &mut self,
        position: &Position,
        fraction: f64,
        price: f64,
        date: DateTime<Utc>,
    ) -> Result<f64> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(OrderError::CloseFraction(fraction).into());
        }
        check_price(price)?;
        let live = self
            .positions
            .iter_mut()
            .find(|p| *p == position && !p.is_closed())
            .ok_or(OrderError::PositionNotOpen(position.id()))?;

        let quantity = if fraction == 1.0 {
            live.quantity()
        } else {
            let requested = fraction * live.initial_quantity();
            if requested > live.quantity() {
                return Err(OrderError::ExceedsRemaining {
                    requested,
                    remaining: live.quantity(),
                }
                .into());
            }
            requested
        };

        self.cash += live.value_of(quantity, price);
        live.reduce(quantity);
        let trade = Trade::new(date, *live, quantity, price);
        self.closed_trades.push(trade);
        debug!(id = position.id(), quantity, price, pnl = trade.pnl(), "position closed");
        Ok(trade.pnl())
    }

    /// Closes every open position at `price`.
    pub fn close_all_positions(&mut self, price: f64) -> Result<()> {
        let open = self.positions.iter().copied().collect::<Vec<_>>();
        for position in open.iter().filter(|p| !p.is_closed()) {
            self.close_position(position, 1.0, price)?;
        }
        self.purge_positions();
        Ok(())
    }

    /// Drops fully closed positions from the open set.
    pub fn purge_positions(&mut self) {
        self.positions.retain(|p| !p.is_closed());
    }

    /// Overrides the fill used when the take-profit of an open position fires.
    pub fn set_exit_price(&mut self, position: &Position, price: f64) -> Result<()> {
        check_price(price)?;
        let live = self.live_mut(position)?;
        live.set_exit_price(price);
        Ok(())
    }

    /// Moves the stop of an open position.
    ///
    /// The stop must stay on the losing side of the entry. A trailing stop can only be tightened,
    /// possibly past the entry; it keeps the offset fixed at open and resumes trailing from the new
    /// level.
    pub fn set_stop(&mut self, position: &Position, price: f64) -> Result<()> {
        check_price(price)?;
        let live = self.live_mut(position)?;
        match (live.trailing_stop(), live.stop_price()) {
            (true, Some(current)) => {
                let looser = match live.side() {
                    PositionSide::Long => price < current,
                    PositionSide::Short => price > current,
                };
                if looser {
                    return Err(OrderError::LoosenTrailingStop {
                        side: live.side(),
                        current,
                        requested: price,
                    }
                    .into());
                }
            }
            _ => check_stop(live.side(), live.entry_price(), price)?,
        }
        live.set_stop(price);
        Ok(())
    }

    pub(crate) fn live_mut(&mut self, position: &Position) -> Result<&mut Position> {
        Ok(self
            .positions
            .iter_mut()
            .find(|p| *p == position && !p.is_closed())
            .ok_or(OrderError::PositionNotOpen(position.id()))?)
    }

    pub(crate) fn record(&mut self, date: DateTime<Utc>, equity: f64) {
        self.current_date = Some(date);
        self.equity.push(equity);
    }
}
