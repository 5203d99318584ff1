//! # EMA Parameter Optimization
//!
//! Searches the EMA period and trailing-stop distance of a trend-following strategy. Every
//! combination runs as an independent backtest, in parallel, and the five best final values are
//! printed.
mod utils;

use gemini_bt::prelude::*;
use ta::Next;
use ta::indicators::ExponentialMovingAverage;

struct Parameters;

impl ParameterCombination for Parameters {
    /// EMA period and trailing stop distance in percent.
    type Output = (usize, f64);

    fn generate() -> Vec<Self::Output> {
        (5..=200)
            .step_by(5)
            .flat_map(|period| [1.0, 2.0, 3.0, 5.0].into_iter().map(move |stop| (period, stop)))
            .collect()
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    utils::init_logs();

    let bars = utils::example_bars();
    let initial_capital = 1_000.0;
    let opt = Optimizer::<Parameters>::new(bars.clone(), initial_capital);

    let mut results = opt.with(
        |&(period, stop)| {
            let ema = ExponentialMovingAverage::new(period).map_err(|e| Error::Msg(e.to_string()))?;
            Ok((ema, stop))
        },
        |account, (ema, stop), lookback| {
            let close = lookback[lookback.len() - 1].close()?;
            let average = ema.next(close);

            if account.positions().count() == 0 && close > average {
                account.open_position(Entry::long(0.5, close).stop(close.subpercent(*stop)).trailing())?;
            }
            Ok(())
        },
    )?;

    results.sort_by(|(_, a), (_, b)| b.total_cmp(a));

    println!("=== TOP 5 OF {} COMBINATIONS ({} BARS) ===", results.len(), bars.len());
    for ((period, stop), value) in results.iter().take(5) {
        println!("period: {period:>3} stop: {stop:.1}% value: {value:.2} ({:+.2}%)", initial_capital.change(*value));
    }

    Ok(())
}
