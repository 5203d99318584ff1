//! # Trend Following with Trailing Stop
//!
//! Goes long when the close is above a 100-period EMA and the MACD histogram is positive, goes short
//! in the opposite case. Every entry carries a 2% trailing stop and no target.
mod utils;

use gemini_bt::prelude::*;
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, MovingAverageConvergenceDivergence, MovingAverageConvergenceDivergenceOutput};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    utils::init_logs();

    let bars = utils::example_bars();
    let initial_capital = 1_000.0;
    let mut bt = Backtest::new(bars, initial_capital)?;
    let mut ema = ExponentialMovingAverage::new(100)?;
    let mut macd = MovingAverageConvergenceDivergence::default();

    bt.run(|account, lookback| {
        let close = lookback[lookback.len() - 1].close()?;
        let output = ema.next(close);
        let MovingAverageConvergenceDivergenceOutput { histogram, .. } = macd.next(close);

        if account.positions().count() > 0 || lookback.len() < 100 {
            return Ok(());
        }

        if close > output && histogram > 0.0 {
            account.open_position(Entry::long(0.25, close).stop(close.subpercent(2.0)).trailing())?;
        } else if close < output && histogram < 0.0 {
            account.open_position(Entry::short(0.25, close).stop(close.addpercent(2.0)).trailing())?;
        }

        Ok(())
    })?;

    #[cfg(feature = "metrics")]
    println!("{}", Summary::from(&bt));

    #[cfg(not(feature = "metrics"))]
    {
        let last_price = bt.bars().last().ok_or(Error::Msg("no bars".to_string()))?.close()?;
        let total_value = bt.total_value(last_price);
        println!("performance {total_value:.2} ({:.2}%)", initial_capital.change(total_value));
    }

    #[cfg(feature = "draws")]
    {
        let options = DrawOptions::default()
            .title("Trailing stop")
            .draw_output(DrawOutput::Svg("trailing_stop.svg".into()));
        Draw::from(&bt).with_options(options).plot()?;
    }

    Ok(())
}
