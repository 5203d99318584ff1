//! # Scaling Out
//!
//! Opens a long on a 5-day breakout and scales out in thirds: one third at +3%, one third at +6%,
//! and the rest when the close falls back under the 10-day low. A 4% stop protects the whole
//! position until it is flat.
mod utils;

use gemini_bt::prelude::*;

fn highest(bars: &[Bar]) -> Result<f64> {
    bars.iter().map(|b| b.high()).try_fold(f64::NEG_INFINITY, |acc, h| Ok(acc.max(h?)))
}

fn lowest(bars: &[Bar]) -> Result<f64> {
    bars.iter().map(|b| b.low()).try_fold(f64::INFINITY, |acc, l| Ok(acc.min(l?)))
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    utils::init_logs();

    let bars = utils::example_bars();
    let mut bt = Backtest::new(bars, 1_000.0)?;

    let curve = bt.run(|account, lookback| {
        let n = lookback.len();
        if n < 11 {
            return Ok(());
        }
        let close = lookback[n - 1].close()?;

        let Some(position) = account.positions().next().copied() else {
            if close > highest(&lookback[n - 6..n - 1])? {
                account.open_position(Entry::long(0.5, close).stop(close.subpercent(4.0)))?;
            }
            return Ok(());
        };

        let gain = position.entry_price().change(close);
        let third = 1.0 / 3.0;
        if close < lowest(&lookback[n - 11..n - 1])? {
            account.close_position(&position, 1.0, close)?;
        } else if gain >= 6.0 && position.size() > 0.5 {
            account.close_position(&position, third, close)?;
        } else if gain >= 3.0 && position.size() > 0.9 {
            account.close_position(&position, third, close)?;
        }
        Ok(())
    })?;

    let best = curve
        .iter()
        .map(|r| r.strategy_return)
        .filter(|r| r.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    println!("bars {} best daily return {:.2}%", curve.len(), best * 100.0);
    println!("opened {} closes {}", bt.opened_trades().len(), bt.closed_trades().len());

    #[cfg(feature = "metrics")]
    println!("{}", Summary::from(&bt));

    Ok(())
}
