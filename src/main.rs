//! Demo run: a moving-average crossover with trailing stops over a synthetic series.
//!
//! Usage: `gemini-bt [bars] [seed]`. Set `RUST_LOG=debug` to see every open, close and exit.

use std::sync::Arc;

use gemini_bt::prelude::*;
use tracing_subscriber::EnvFilter;

const FAST: usize = 10;
const SLOW: usize = 30;

fn average(bars: &[Bar]) -> Result<f64> {
    let sum = bars.iter().map(|b| b.close()).sum::<Result<f64>>()?;
    Ok(sum / bars.len() as f64)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let count = args.next().and_then(|a| a.parse().ok()).unwrap_or(500);
    let seed = args.next().and_then(|a| a.parse().ok()).unwrap_or(42);

    let bars = gemini_bt::utils::synthetic_bars(count, seed, 100.0);
    let mut backtest = Backtest::new(Arc::from_iter(bars), 10_000.0)?;

    backtest.run(|account, lookback| {
        if lookback.len() < SLOW {
            return Ok(());
        }
        let close = lookback[lookback.len() - 1].close()?;
        let fast = average(&lookback[lookback.len() - FAST..])?;
        let slow = average(&lookback[lookback.len() - SLOW..])?;

        let open = account.positions().next().copied();
        match open {
            None if fast > slow => {
                account.open_position(Entry::long(0.5, close).stop(close.subpercent(4.0)).trailing())?;
            }
            None if fast < slow => {
                account.open_position(Entry::short(0.5, close).stop(close.addpercent(4.0)).trailing())?;
            }
            Some(position) => {
                let reversed = match position.side() {
                    PositionSide::Long => fast < slow,
                    PositionSide::Short => fast > slow,
                };
                if reversed {
                    account.close_position(&position, 1.0, close)?;
                }
            }
            None => {}
        }
        Ok(())
    })?;

    println!("{}", Summary::from(&backtest));

    #[cfg(feature = "draws")]
    {
        let options = DrawOptions::default()
            .title("Moving average crossover")
            .draw_output(DrawOutput::Svg("gemini.svg".into()));
        Draw::from(&backtest).with_options(options).plot()?;
    }

    Ok(())
}
