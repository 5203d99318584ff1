use std::fmt;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// One row of the price series.
///
/// Only the date is mandatory. Price fields that are absent in the source are kept as
/// `None` and reported by [`validate`]; reading one of them returns [`Error::MissingField`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    date: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    open: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    high: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    low: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    close: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    volume: Option<f64>,
}

type Row = (DateTime<Utc>, f64, f64, f64, f64, f64);
impl From<Row> for Bar {
    fn from((date, open, high, low, close, volume): Row) -> Self {
        Self {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }
}

fn field(value: Option<f64>, name: &'static str, date: DateTime<Utc>) -> Result<f64> {
    value.ok_or(Error::MissingField(name, date))
}

impl Bar {
    /// Returns the bar date.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Returns the open price.
    pub fn open(&self) -> Result<f64> {
        field(self.open, "open", self.date)
    }

    /// Returns the highest price.
    pub fn high(&self) -> Result<f64> {
        field(self.high, "high", self.date)
    }

    /// Returns the lowest price.
    pub fn low(&self) -> Result<f64> {
        field(self.low, "low", self.date)
    }

    /// Returns the close price.
    pub fn close(&self) -> Result<f64> {
        field(self.close, "close", self.date)
    }

    /// Returns the traded volume.
    pub fn volume(&self) -> Result<f64> {
        field(self.volume, "volume", self.date)
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.is_none().then_some(name))
        .collect()
    }
}

/// Builder for [`Bar`].
#[derive(Debug, Default)]
pub struct BarBuilder {
    date: Option<DateTime<Utc>>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl BarBuilder {
    /// Starts an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the bar date.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the open price.
    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    /// Sets the highest price.
    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    /// Sets the lowest price.
    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the close price.
    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Sets the traded volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Builds the bar. Fails only when the date is missing.
    pub fn build(self) -> Result<Bar> {
        let date = self.date.ok_or(Error::MissingDate)?;
        Ok(Bar {
            date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// A non-fatal problem found in the input series.
#[derive(Debug, Clone, PartialEq)]
pub enum DataWarning {
    /// The series has no bars.
    Empty,
    /// A bar lacks one or more of the OHLCV fields.
    MissingFields {
        /// Position of the bar in the series.
        index: usize,
        /// Names of the absent fields.
        fields: Vec<&'static str>,
    },
    /// A bar is dated before the bar preceding it.
    OutOfOrder {
        /// Position of the offending bar.
        index: usize,
        /// Date of the previous bar.
        previous: DateTime<Utc>,
        /// Date of the offending bar.
        current: DateTime<Utc>,
    },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "price series is empty"),
            Self::MissingFields { index, fields } => {
                write!(f, "bar {index} is missing {} column(s), series must be OHLCV", fields.join(", "))
            }
            Self::OutOfOrder {
                index,
                previous,
                current,
            } => write!(f, "bar {index} dated {current} precedes previous bar dated {previous}"),
        }
    }
}

/// Checks a series for missing fields and date regressions.
pub fn validate(bars: &[Bar]) -> Vec<DataWarning> {
    if bars.is_empty() {
        return vec![DataWarning::Empty];
    }

    let mut warnings = Vec::new();
    for (index, bar) in bars.iter().enumerate() {
        let fields = bar.missing_fields();
        if !fields.is_empty() {
            warnings.push(DataWarning::MissingFields { index, fields });
        }
    }
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].date < pair[0].date {
            warnings.push(DataWarning::OutOfOrder {
                index: index + 1,
                previous: pair[0].date,
                current: pair[1].date,
            });
        }
    }
    warnings
}
