use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    engine::*,
    errors::{Error, Result},
};

/// Bar-by-bar replay of a strategy over a price series.
///
/// Each call to [`Backtest::run`] starts from a fresh [`Account`]. The account of the last run stays
/// readable through `Deref`.
#[derive(Debug, Clone)]
pub struct Backtest {
    data: Arc<[Bar]>,
    account: Account,
    curve: EquityCurve,
    warnings: Vec<DataWarning>,
}

impl std::ops::Deref for Backtest {
    type Target = Account;

    fn deref(&self) -> &Self::Target {
        &self.account
    }
}

impl Backtest {
    /// Creates a new backtest instance.
    ///
    /// ### Arguments
    /// * `data` - Bars in chronological order.
    /// * `initial_capital` - Starting cash of each run.
    ///
    /// Problems in the data (missing columns, dates going backwards, no bars) are logged and kept in
    /// [`Backtest::warnings`]; they do not prevent the run.
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use gemini_bt::prelude::*;
    /// use chrono::DateTime;
    ///
    /// let bar = BarBuilder::builder().date(DateTime::default()).close(100.0).build().unwrap();
    /// let bt = Backtest::new(Arc::from_iter(vec![bar]), 1000.0).unwrap();
    /// assert_eq!(bt.warnings().len(), 1);
    /// ```
    pub fn new(data: Arc<[Bar]>, initial_capital: f64) -> Result<Self> {
        if initial_capital <= 0.0 || !initial_capital.is_finite() {
            return Err(Error::NegZeroBalance(initial_capital));
        }

        let warnings = validate(&data);
        for warning in &warnings {
            warn!("{warning}");
        }

        Ok(Self {
            data,
            warnings,
            curve: EquityCurve::default(),
            account: Account::new(initial_capital),
        })
    }

    /// Returns an iterator over the bars.
    pub fn bars(&self) -> std::slice::Iter<'_, Bar> {
        self.data.iter()
    }

    /// Returns the account of the last run.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Returns the problems found in the data at construction.
    pub fn warnings(&self) -> &[DataWarning] {
        &self.warnings
    }

    /// Returns the per-bar output of the last run.
    pub fn curve(&self) -> &EquityCurve {
        &self.curve
    }

    /// Runs the strategy once per bar.
    ///
    /// For every bar, in order: the equity is valued at the close, stops and targets of open
    /// positions are checked against the bar extremes, closed positions are purged, the equity is
    /// recorded, then `strategy` is called with the account and every bar up to and including the
    /// current one.
    ///
    /// Any error, from the strategy or from an invalid order, aborts the run and is returned as is.
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use gemini_bt::prelude::*;
    /// use chrono::{DateTime, Duration};
    ///
    /// let start = DateTime::default();
    /// let bars = vec![
    ///     Bar::from((start, 100.0, 101.0, 99.0, 100.0, 1.0)),
    ///     Bar::from((start + Duration::days(1), 100.0, 112.0, 100.0, 110.0, 1.0)),
    /// ];
    /// let mut bt = Backtest::new(Arc::from_iter(bars), 1000.0).unwrap();
    /// let curve = bt
    ///     .run(|account, lookback| {
    ///         if lookback.len() == 1 {
    ///             let close = lookback[0].close()?;
    ///             account.open_position(Entry::long(1.0, close).take_profit(110.0))?;
    ///         }
    ///         Ok(())
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(curve.len(), 2);
    /// assert_eq!(bt.cash(), 1100.0);
    /// ```
    pub fn run<S>(&mut self, mut strategy: S) -> Result<EquityCurve>
    where
        S: FnMut(&mut Account, &[Bar]) -> Result<()>,
    {
        self.reset();
        info!(bars = self.data.len(), initial_capital = self.account.initial_capital(), "backtest started");

        let bars = Arc::clone(&self.data);
        let mut points = Vec::with_capacity(bars.len());
        for (index, bar) in bars.iter().enumerate() {
            let close = bar.close()?;
            let equity = self.account.total_value(close);

            self.execute_exits(bar)?;
            self.account.purge_positions();

            points.push((bar.date(), close, equity));
            self.account.record(bar.date(), equity);

            strategy(&mut self.account, &bars[..=index])?;
            self.account.purge_positions();
        }

        self.curve = EquityCurve::from_points(points);
        info!(
            open_positions = self.account.positions().count(),
            opened = self.account.opened_trades().len(),
            closed = self.account.closed_trades().len(),
            "backtest finished"
        );
        Ok(self.curve.clone())
    }

    /// Checks stops, targets and trailing stops of the open positions against `bar`.
    ///
    /// Decisions are taken on a snapshot of the open set; closes go to the live account.
    fn execute_exits(&mut self, bar: &Bar) -> Result<()> {
        let date = bar.date();
        let snapshot = self.account.positions().copied().collect::<Vec<_>>();

        for position in &snapshot {
            type Extreme = fn(&Bar) -> Result<f64>;
            let (adverse, favorable): (Extreme, Extreme) = match position.side() {
                PositionSide::Long => (Bar::low, Bar::high),
                PositionSide::Short => (Bar::high, Bar::low),
            };

            if let Some(stop) = position.stop_price()
                && position.stop_hit(adverse(bar)?)
            {
                debug!(id = position.id(), stop, "stop hit");
                self.account.close_at(position, 1.0, stop, date)?;
            } else if let Some(target) = position.take_profit_price()
                && position.tp_hit(favorable(bar)?)
            {
                let fill = position.exit_price().unwrap_or(target);
                debug!(id = position.id(), fill, "take profit hit");
                self.account.close_at(position, 1.0, fill, date)?;
            } else if position.trailing_stop() {
                let (open, close) = (bar.open()?, bar.close()?);
                let favorable_bar = match position.side() {
                    PositionSide::Long => close > open,
                    PositionSide::Short => close < open,
                };
                if favorable_bar {
                    self.account.live_mut(position)?.stop_adjust(close);
                }
            }
        }
        Ok(())
    }

    /// Returns the strategy equity recorded for the bar dated `date`.
    pub fn equity_at(&self, date: &DateTime<Utc>) -> Option<f64> {
        self.curve.get(date).map(|r| r.strategy_equity)
    }

    /// Resets the account and the output to their initial state.
    pub fn reset(&mut self) {
        self.account = Account::new(self.account.initial_capital());
        self.curve = EquityCurve::default();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use crate::engine::*;
    use crate::errors::{Error, OrderError};

    fn day(n: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_secs(1515151515).unwrap() + Duration::days(n)
    }

    fn bars(rows: &[(f64, f64, f64, f64)]) -> Arc<[Bar]> {
        rows.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar::from((day(i as i64), open, high, low, close, 1.0)))
            .collect()
    }

    #[test]
    fn rejects_non_positive_capital() {
        let data = bars(&[(1.0, 1.0, 1.0, 1.0)]);
        assert!(matches!(Backtest::new(data.clone(), 0.0), Err(Error::NegZeroBalance(_))));
        assert!(matches!(Backtest::new(data, -5.0), Err(Error::NegZeroBalance(_))));
    }

    #[test]
    fn scenario_flat_strategy() {
        let data = bars(&[
            (100.0, 105.0, 95.0, 101.0),
            (101.0, 110.0, 100.0, 108.0),
            (108.0, 109.0, 90.0, 92.0),
        ]);
        let mut bt = Backtest::new(data, 10_000.0).unwrap();
        let curve = bt.run(|_, _| Ok(())).unwrap();

        assert_eq!(bt.equity().len(), 3);
        assert_eq!(curve.len(), 3);
        assert!(curve.records()[0].strategy_return.is_nan());
        assert!(curve.records()[0].benchmark_return.is_nan());
        for record in curve.iter() {
            assert_eq!(record.strategy_equity, 10_000.0);
        }
        for record in curve.iter().skip(1) {
            assert_eq!(record.strategy_return, 0.0);
        }
        assert_eq!(curve.records()[2].benchmark_equity, 92.0);
    }

    #[test]
    fn scenario_long_stop_loss() {
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (94.0, 95.0, 85.0, 88.0)]);
        let mut bt = Backtest::new(data, 10_000.0).unwrap();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0).stop(90.0))?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(bt.positions().count(), 0);
        assert_eq!(bt.cash(), 9_000.0);
        let trade = bt.closed_trades()[0];
        assert_eq!(trade.price(), 90.0);
        assert_eq!(trade.date(), day(1));
        assert_eq!(trade.side(), PositionSide::Long);
    }

    #[test]
    fn scenario_short_take_profit_uses_exit_price() {
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (95.0, 96.0, 75.0, 78.0)]);
        let mut bt = Backtest::new(data, 10_000.0).unwrap();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::short(1.0, 100.0).take_profit(80.0).exit_price(80.0))?;
            }
            Ok(())
        })
        .unwrap();

        let trade = bt.closed_trades()[0];
        assert_eq!(trade.price(), 80.0);
        assert_eq!(trade.pnl(), 2_000.0);
        assert_eq!(bt.cash(), 12_000.0);
    }

    #[test]
    fn stop_wins_over_take_profit() {
        // the second bar reaches both the stop (low 85) and the target (high 120)
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (100.0, 120.0, 85.0, 100.0)]);
        let mut bt = Backtest::new(data, 10_000.0).unwrap();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0).stop(90.0).take_profit(110.0))?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(bt.closed_trades().len(), 1);
        assert_eq!(bt.closed_trades()[0].price(), 90.0);
        assert_eq!(bt.cash(), 9_000.0);
    }

    #[test]
    fn long_stop_fills_at_stop_when_open_is_below() {
        // opens under the stop, between the low and the stop
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (88.0, 95.0, 85.0, 92.0)]);
        let mut bt = Backtest::new(data, 10_000.0).unwrap();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0).stop(90.0))?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(bt.closed_trades()[0].price(), 90.0);
        assert_eq!(bt.cash(), 9_000.0);
    }

    #[test]
    fn short_stop_fills_at_stop_price() {
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (100.0, 112.0, 99.0, 108.0)]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::short(1.0, 100.0).stop(105.0).take_profit(90.0))?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(bt.closed_trades()[0].price(), 105.0);
        assert_eq!(bt.cash(), 950.0);
    }

    #[test]
    fn equity_is_valued_before_exits() {
        let data = bars(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 100.0, 80.0, 95.0),
            (95.0, 96.0, 94.0, 95.0),
        ]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let curve = bt
            .run(|account, lookback| {
                if lookback.len() == 1 {
                    account.open_position(Entry::long(1.0, 100.0).stop(90.0))?;
                }
                Ok(())
            })
            .unwrap();

        let equity = curve.iter().map(|r| r.strategy_equity).collect::<Vec<_>>();
        // bar 1 is valued at its close (95) before the stop closes the position at 90
        assert_eq!(equity, vec![1_000.0, 950.0, 900.0]);
        assert_eq!(bt.equity(), &equity[..]);
    }

    #[test]
    fn trailing_stop_follows_up_closes() {
        let data = bars(&[
            (99.0, 101.0, 98.0, 100.0),
            (100.0, 110.0, 99.0, 108.0),
            (108.0, 109.0, 106.0, 107.0),
            (107.0, 107.5, 102.0, 104.0),
        ]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let mut stops = Vec::new();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0).stop(95.0).trailing())?;
            }
            stops.extend(account.positions().filter_map(|p| p.stop_price()));
            Ok(())
        })
        .unwrap();

        // up bar to 108 trails to 103, down bar keeps it, then the low of 102 stops out at 103
        assert_eq!(stops, vec![95.0, 103.0, 103.0]);
        assert_eq!(bt.closed_trades()[0].price(), 103.0);
        assert_eq!(bt.cash(), 1_030.0);
    }

    #[test]
    fn strategy_cannot_loosen_trailing_stop() {
        let data = bars(&[
            (99.0, 101.0, 98.0, 100.0),
            (100.0, 110.0, 99.0, 108.0),
            (108.0, 109.0, 106.0, 107.0),
        ]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let mut stops = Vec::new();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0).stop(95.0).trailing())?;
            } else if let Some(position) = account.positions().next().copied() {
                let result = account.set_stop(&position, 91.0);
                assert!(matches!(result, Err(Error::InvalidOrder(OrderError::LoosenTrailingStop { .. }))));
            }
            stops.extend(account.positions().filter_map(|p| p.stop_price()));
            Ok(())
        })
        .unwrap();

        assert_eq!(stops, vec![95.0, 103.0, 103.0]);
    }

    #[test]
    fn trailing_short_follows_down_closes() {
        let data = bars(&[
            (101.0, 102.0, 99.0, 100.0),
            (100.0, 101.0, 90.0, 92.0),
            (92.0, 93.0, 91.0, 92.5),
        ]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::short(1.0, 100.0).stop(104.0).trailing())?;
            }
            Ok(())
        })
        .unwrap();

        let stop = bt.positions().next().unwrap().stop_price().unwrap();
        assert_eq!(stop, 96.0);
    }

    #[test]
    fn partial_close_from_strategy() {
        let data = bars(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 111.0, 100.0, 110.0),
            (110.0, 121.0, 110.0, 120.0),
        ]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let mut sizes = Vec::new();
        bt.run(|account, lookback| {
            let close = lookback.last().unwrap().close()?;
            match lookback.len() {
                1 => {
                    account.open_position(Entry::long(1.0, close))?;
                }
                _ => {
                    let position = *account.positions().next().unwrap();
                    account.close_position(&position, 0.5, close)?;
                }
            }
            sizes.extend(account.positions().map(|p| p.size()));
            Ok(())
        })
        .unwrap();

        assert_eq!(sizes, vec![1.0, 0.5, 0.0]);
        assert_eq!(bt.positions().count(), 0);
        assert_eq!(bt.closed_trades().len(), 2);
        // 5 units at 110 and 5 units at 120
        assert_eq!(bt.cash(), 1_150.0);
    }

    #[test]
    fn invalid_order_aborts_run() {
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (100.0, 101.0, 99.0, 100.0)]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let result = bt.run(|account, _| {
            account.open_position(Entry::long(2.0, 100.0))?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::InvalidOrder(OrderError::SizeFraction(_)))));
        assert_eq!(bt.equity().len(), 1);
    }

    #[test]
    fn strategy_error_propagates() {
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (100.0, 101.0, 99.0, 100.0)]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let result = bt.run(|_, lookback| {
            if lookback.len() == 2 {
                return Err(Error::strategy("indicator not ready"));
            }
            Ok(())
        });
        match result {
            Err(Error::Strategy(err)) => assert_eq!(err.to_string(), "indicator not ready"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn lookback_is_inclusive() {
        let data = bars(&[(1.0, 1.0, 1.0, 1.0), (2.0, 2.0, 2.0, 2.0), (3.0, 3.0, 3.0, 3.0)]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let mut seen = Vec::new();
        bt.run(|account, lookback| {
            assert_eq!(account.current_date(), Some(lookback.last().unwrap().date()));
            seen.push(lookback.iter().map(|b| b.close().unwrap()).collect::<Vec<_>>());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![vec![1.0], vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn missing_field_fails_only_when_read() {
        let data: Arc<[Bar]> = Arc::from_iter(vec![
            BarBuilder::builder().date(day(0)).close(100.0).build().unwrap(),
            BarBuilder::builder().date(day(1)).close(101.0).build().unwrap(),
        ]);
        let mut bt = Backtest::new(data.clone(), 1_000.0).unwrap();
        assert_eq!(bt.warnings().len(), 2);
        assert!(bt.run(|_, _| Ok(())).is_ok());

        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let result = bt.run(|account, lookback| {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0).stop(90.0))?;
            }
            Ok(())
        });
        assert!(matches!(result, Err(Error::MissingField("low", _))));
    }

    #[test]
    fn rerun_starts_fresh() {
        let data = bars(&[(100.0, 101.0, 99.0, 100.0), (100.0, 111.0, 100.0, 110.0)]);
        let mut bt = Backtest::new(data, 1_000.0).unwrap();
        let strategy = |account: &mut Account, lookback: &[Bar]| -> crate::errors::Result<()> {
            if lookback.len() == 1 {
                account.open_position(Entry::long(1.0, 100.0))?;
            }
            Ok(())
        };
        let first = bt.run(strategy).unwrap();
        let second = bt.run(strategy).unwrap();
        assert_eq!(first.records()[1].strategy_equity, second.records()[1].strategy_equity);
        assert_eq!(bt.opened_trades().len(), 1);
        assert_eq!(bt.equity_at(&day(1)), Some(1_100.0));
    }

    #[test]
    fn sizes_never_increase() {
        let data: Arc<[Bar]> = crate::utils::synthetic_bars(200, 7, 100.0).into();
        let mut bt = Backtest::new(data, 10_000.0).unwrap();
        let mut last_size = std::collections::HashMap::new();
        bt.run(|account, lookback| {
            for p in account.positions() {
                assert!(!p.is_closed());
                let previous = last_size.insert(p.id(), p.size()).unwrap_or(1.0);
                assert!(p.size() <= previous);
            }
            let close = lookback.last().unwrap().close()?;
            match lookback.len() % 5 {
                0 => {
                    account.open_position(Entry::long(0.3, close).stop(close * 0.97).take_profit(close * 1.05).trailing())?;
                }
                2 => {
                    account.open_position(Entry::short(0.3, close).stop(close * 1.03).trailing())?;
                }
                4 => {
                    if let Some(position) = account.positions().next().copied() {
                        account.close_position(&position, 1.0, close)?;
                    }
                }
                _ => {}
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(bt.equity().len(), 200);
        assert_eq!(bt.curve().len(), 200);
    }
}
