//! # Mean Reversion with Take Profit and Stop Loss
//!
//! Buys when the close falls 5% under its 20-period SMA, with a 1:3 risk/reward bracket. The target
//! is filled at a price slightly under the take-profit level to model a conservative exit.
mod utils;

use gemini_bt::prelude::*;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    utils::init_logs();

    let bars = utils::example_bars();
    let mut bt = Backtest::new(bars, 1_000.0)?;
    let mut sma = SimpleMovingAverage::new(20)?;

    bt.run(|account, lookback| {
        let close = lookback[lookback.len() - 1].close()?;
        let average = sma.next(close);

        if lookback.len() >= 20 && close < average.subpercent(5.0) {
            let take_profit = close.addpercent(6.0);
            account.open_position(
                Entry::long(0.1, close)
                    .stop(close.subpercent(2.0))
                    .take_profit(take_profit)
                    .exit_price(take_profit.subpercent(0.5)),
            )?;
        }

        Ok(())
    })?;

    let last_price = bt.bars().last().ok_or(Error::Msg("no bars".to_string()))?.close()?;
    println!("open positions {}", bt.positions().count());
    println!("value with open positions {:.2}", bt.total_value(last_price));

    #[cfg(feature = "metrics")]
    println!("{}", Summary::from(&bt));

    Ok(())
}
