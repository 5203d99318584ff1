use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Benchmark and strategy equity at one bar.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityRecord {
    /// Bar date.
    pub date: DateTime<Utc>,
    /// Close of the bar.
    pub benchmark_equity: f64,
    /// Account total value at the bar close, before exits and strategy decisions.
    pub strategy_equity: f64,
    /// Change of the benchmark from the previous bar; `NaN` on the first bar.
    pub benchmark_return: f64,
    /// Change of the strategy equity from the previous bar; `NaN` on the first bar.
    pub strategy_return: f64,
}

/// Per-bar output of a run, in bar order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquityCurve {
    records: Vec<EquityRecord>,
}

impl EquityCurve {
    pub(crate) fn from_points(points: Vec<(DateTime<Utc>, f64, f64)>) -> Self {
        let benchmark = returns(points.iter().map(|(_, b, _)| *b));
        let strategy = returns(points.iter().map(|(_, _, s)| *s));
        let records = points
            .into_iter()
            .zip(benchmark.into_iter().zip(strategy))
            .map(
                |((date, benchmark_equity, strategy_equity), (benchmark_return, strategy_return))| EquityRecord {
                    date,
                    benchmark_equity,
                    strategy_equity,
                    benchmark_return,
                    strategy_return,
                },
            )
            .collect();
        Self { records }
    }

    /// Returns the records in bar order.
    pub fn records(&self) -> &[EquityRecord] {
        &self.records
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, EquityRecord> {
        self.records.iter()
    }

    /// Number of recorded bars.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no bar was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the first record dated `date`.
    pub fn get(&self, date: &DateTime<Utc>) -> Option<&EquityRecord> {
        self.records.iter().find(|r| &r.date == date)
    }
}

impl<'a> IntoIterator for &'a EquityCurve {
    type Item = &'a EquityRecord;
    type IntoIter = std::slice::Iter<'a, EquityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Simple returns `(v[t] - v[t-1]) / v[t-1]`, with `NaN` for the first value.
pub fn returns<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut previous: Option<f64> = None;
    values
        .into_iter()
        .map(|value| {
            let r = previous.map_or(f64::NAN, |prev| (value - prev) / prev);
            previous = Some(value);
            r
        })
        .collect()
}
