use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::engine::Bar;

/// Generates a deterministic random-walk series of daily bars.
///
/// Bars start on 2018-01-05 and are one day apart. The same `seed` always gives the same series.
pub fn synthetic_bars(count: usize, seed: u64, base_price: f64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = DateTime::<Utc>::from_timestamp(1_515_151_515, 0).unwrap_or_default();
    let mut open = base_price;

    (0..count)
        .map(|i| {
            // daily move within +/- 3%
            let change = rng.random_range(-0.03..0.03);
            let close = (open * (1.0 + change)).max(0.01);
            let wick_up = open.max(close) * rng.random_range(0.0..0.01);
            let wick_down = open.min(close) * rng.random_range(0.0..0.01);
            let volume = 1_000.0 + 500.0 * rng.random::<f64>();
            let bar = Bar::from((
                start + Duration::days(i as i64),
                open,
                open.max(close) + wick_up,
                open.min(close) - wick_down,
                close,
                volume,
            ));
            open = close;
            bar
        })
        .collect()
}

/// Reads a JSON array of bars from `filepath`.
///
/// Each object needs a `date` (RFC 3339); `open`, `high`, `low`, `close` and `volume` may be omitted
/// and are then reported as data warnings by the backtest.
#[cfg(feature = "serde")]
pub fn read_bars(filepath: impl AsRef<std::path::Path>) -> crate::errors::Result<Vec<Bar>> {
    use crate::errors::Error;
    use std::{fs::File, io::BufReader};

    let file = File::open(filepath)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(Error::from)
}
