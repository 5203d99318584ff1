use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Direction of a position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionSide {
    /// Profits when price rises.
    Long,
    /// Profits when price falls.
    Short,
}

/// A single trade with its exit rules.
///
/// Positions are created by [`Account::open_position`](super::Account::open_position) and only
/// mutated by the account and the backtest loop. Equality is by identifier.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Position {
    id: u32,
    side: PositionSide,
    entry_price: f64,
    entry_date: DateTime<Utc>,
    initial_quantity: f64,
    quantity: f64,
    stop_price: Option<f64>,
    take_profit_price: Option<f64>,
    trailing_stop: bool,
    trail_offset: Option<f64>,
    exit_price: Option<f64>,
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u32,
        side: PositionSide,
        entry_price: f64,
        entry_date: DateTime<Utc>,
        quantity: f64,
        stop_price: Option<f64>,
        take_profit_price: Option<f64>,
        trailing_stop: bool,
        exit_price: Option<f64>,
    ) -> Self {
        let trail_offset = if trailing_stop {
            stop_price.map(|stop| (entry_price - stop).abs())
        } else {
            None
        };
        Self {
            id,
            side,
            entry_price,
            entry_date,
            initial_quantity: quantity,
            quantity,
            stop_price,
            take_profit_price,
            trailing_stop,
            trail_offset,
            exit_price: exit_price.or(take_profit_price),
        }
    }

    /// Returns the identifier assigned by the account.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the direction.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    /// Returns the fill price at open.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the bar date at open.
    pub fn entry_date(&self) -> DateTime<Utc> {
        self.entry_date
    }

    /// Returns the units opened.
    pub fn initial_quantity(&self) -> f64 {
        self.initial_quantity
    }

    /// Returns the units still open.
    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Returns the remaining fraction of the original quantity, in `[0, 1]`.
    pub fn size(&self) -> f64 {
        self.quantity / self.initial_quantity
    }

    /// Returns the stop-loss price.
    pub fn stop_price(&self) -> Option<f64> {
        self.stop_price
    }

    /// Returns the take-profit price.
    pub fn take_profit_price(&self) -> Option<f64> {
        self.take_profit_price
    }

    /// Whether the stop ratchets with favorable closes.
    pub fn trailing_stop(&self) -> bool {
        self.trailing_stop
    }

    /// Returns the fill used when the take-profit fires.
    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    /// Whether every unit has been closed.
    pub fn is_closed(&self) -> bool {
        self.quantity == 0.0
    }

    /// True when `extreme` reaches the stop: the bar's low for a long, its high for a short.
    pub fn stop_hit(&self, extreme: f64) -> bool {
        match (self.side, self.stop_price) {
            (_, None) => false,
            (PositionSide::Long, Some(stop)) => extreme <= stop,
            (PositionSide::Short, Some(stop)) => extreme >= stop,
        }
    }

    /// True when `extreme` reaches the target: the bar's high for a long, its low for a short.
    pub fn tp_hit(&self, extreme: f64) -> bool {
        match (self.side, self.take_profit_price) {
            (_, None) => false,
            (PositionSide::Long, Some(target)) => extreme >= target,
            (PositionSide::Short, Some(target)) => extreme <= target,
        }
    }

    /// Trails the stop behind `reference` by the offset fixed at open.
    ///
    /// The stop only ever tightens: up for a long, down for a short.
    pub fn stop_adjust(&mut self, reference: f64) {
        if !self.trailing_stop {
            return;
        }
        let (Some(offset), Some(stop)) = (self.trail_offset, self.stop_price) else {
            return;
        };
        match self.side {
            PositionSide::Long => {
                let candidate = reference - offset;
                if candidate > stop {
                    self.stop_price = Some(candidate);
                }
            }
            PositionSide::Short => {
                let candidate = reference + offset;
                if candidate < stop {
                    self.stop_price = Some(candidate);
                }
            }
        }
    }

    /// Value of `quantity` units at `price`, as credited to cash when they are closed.
    ///
    /// A short returns the notional reserved at entry plus its profit.
    pub fn value_of(&self, quantity: f64, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => quantity * price,
            PositionSide::Short => quantity * (2.0 * self.entry_price - price),
        }
    }

    /// Value of the open units at `price`.
    pub fn mark_to_market(&self, price: f64) -> f64 {
        self.value_of(self.quantity, price)
    }

    /// Unrealized profit of the open units at `price`.
    pub fn estimate_pnl(&self, price: f64) -> f64 {
        pnl(self.side, self.entry_price, self.quantity, price)
    }

    pub(crate) fn reduce(&mut self, quantity: f64) {
        let remaining = self.quantity - quantity;
        // float residue of repeated partial closes
        self.quantity = if remaining <= self.initial_quantity * 1e-12 {
            0.0
        } else {
            remaining
        };
    }

    pub(crate) fn set_exit_price(&mut self, price: f64) {
        self.exit_price = Some(price);
    }

    pub(crate) fn set_stop(&mut self, price: f64) {
        self.stop_price = Some(price);
    }
}

pub(crate) fn pnl(side: PositionSide, entry: f64, quantity: f64, price: f64) -> f64 {
    match side {
        PositionSide::Long => (price - entry) * quantity,
        PositionSide::Short => (entry - price) * quantity,
    }
}

/// Snapshot of a position taken when it is opened or (partially) closed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    date: DateTime<Utc>,
    position: Position,
    quantity: f64,
    price: f64,
}

impl Trade {
    pub(crate) fn new(date: DateTime<Utc>, position: Position, quantity: f64, price: f64) -> Self {
        Self {
            date,
            position,
            quantity,
            price,
        }
    }

    /// Returns the date of the event.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Returns the direction of the traded position.
    pub fn side(&self) -> PositionSide {
        self.position.side
    }

    /// Returns the position as it was right after the event.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Returns the units opened or closed.
    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Returns the fill price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Realized profit of the traded units; zero for an opening trade.
    pub fn pnl(&self) -> f64 {
        pnl(self.position.side, self.position.entry_price, self.quantity, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(side: PositionSide, stop: Option<f64>, take_profit: Option<f64>, trailing: bool) -> Position {
        Position::new(1, side, 100.0, DateTime::default(), 10.0, stop, take_profit, trailing, None)
    }

    #[test]
    fn long_stop_and_target() {
        let p = position(PositionSide::Long, Some(90.0), Some(120.0), false);
        assert!(p.stop_hit(90.0));
        assert!(p.stop_hit(85.0));
        assert!(!p.stop_hit(90.5));
        assert!(p.tp_hit(120.0));
        assert!(!p.tp_hit(119.9));
    }

    #[test]
    fn short_stop_and_target() {
        let p = position(PositionSide::Short, Some(110.0), Some(80.0), false);
        assert!(p.stop_hit(110.0));
        assert!(!p.stop_hit(109.0));
        assert!(p.tp_hit(75.0));
        assert!(!p.tp_hit(81.0));
    }

    #[test]
    fn absent_levels_never_fire() {
        let p = position(PositionSide::Long, None, None, false);
        assert!(!p.stop_hit(0.0));
        assert!(!p.tp_hit(f64::MAX));
    }

    #[test]
    fn exit_price_defaults_to_target() {
        let p = position(PositionSide::Long, None, Some(120.0), false);
        assert_eq!(p.exit_price(), Some(120.0));

        let p = Position::new(1, PositionSide::Long, 100.0, DateTime::default(), 1.0, None, Some(120.0), false, Some(118.0));
        assert_eq!(p.exit_price(), Some(118.0));
    }

    #[test]
    fn trailing_long_never_loosens() {
        let mut p = position(PositionSide::Long, Some(95.0), None, true);
        let mut last = p.stop_price().unwrap();
        for reference in [110.0, 104.0, 120.0, 90.0, 121.0] {
            p.stop_adjust(reference);
            let stop = p.stop_price().unwrap();
            assert!(stop >= last);
            last = stop;
        }
        assert_eq!(last, 116.0);
    }

    #[test]
    fn trailing_short_never_loosens() {
        let mut p = position(PositionSide::Short, Some(105.0), None, true);
        let mut last = p.stop_price().unwrap();
        for reference in [90.0, 96.0, 80.0, 130.0] {
            p.stop_adjust(reference);
            let stop = p.stop_price().unwrap();
            assert!(stop <= last);
            last = stop;
        }
        assert_eq!(last, 85.0);
    }

    #[test]
    fn stop_adjust_ignored_without_trailing() {
        let mut p = position(PositionSide::Long, Some(95.0), None, false);
        p.stop_adjust(200.0);
        assert_eq!(p.stop_price(), Some(95.0));
    }

    #[test]
    fn mark_to_market_by_side() {
        let long = position(PositionSide::Long, None, None, false);
        assert_eq!(long.mark_to_market(110.0), 1100.0);
        assert_eq!(long.estimate_pnl(110.0), 100.0);

        let short = position(PositionSide::Short, None, None, false);
        assert_eq!(short.mark_to_market(90.0), 1100.0);
        assert_eq!(short.estimate_pnl(90.0), 100.0);
        assert_eq!(short.mark_to_market(110.0), 900.0);
    }

    #[test]
    fn reduce_to_zero() {
        let mut p = position(PositionSide::Long, None, None, false);
        p.reduce(5.0);
        assert_eq!(p.size(), 0.5);
        assert!(!p.is_closed());
        p.reduce(5.0);
        assert!(p.is_closed());
    }

    #[test]
    fn equality_by_id() {
        let a = position(PositionSide::Long, None, None, false);
        let mut b = a;
        b.reduce(1.0);
        assert_eq!(a, b);
    }
}
