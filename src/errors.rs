use chrono::{DateTime, Utc};

use crate::engine::PositionSide;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building data, placing orders or running a backtest.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The initial capital is not positive. Trading requires a positive balance.
    #[error("Initial capital must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// A bar was built without a date.
    #[error("Bar date is missing")]
    MissingDate,

    /// A bar field read by the engine or the strategy is absent from the data.
    #[error("Bar dated {1} has no `{0}` value")]
    MissingField(&'static str, DateTime<Utc>),

    /// An open or close request violates the order rules. The run is aborted.
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    /// Raised by a strategy callback.
    #[error("Strategy error: {0}")]
    Strategy(Box<dyn std::error::Error + Send + Sync>),

    /// Generic message, mostly for drawing.
    #[error("{0}")]
    Msg(String),

    /// Drawing backend failure.
    #[cfg(feature = "draws")]
    #[error("Plotters error: {0}")]
    Plotters(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Wraps any error raised inside a strategy callback.
    pub fn strategy<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Strategy(err.into())
    }
}

/// Reasons an open or close request is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    /// The fraction of cash to commit is outside `(0, 1]`.
    #[error("size fraction must be in (0, 1] (got: {0})")]
    SizeFraction(f64),

    /// The fraction of the original quantity to close is outside `(0, 1]`.
    #[error("close fraction must be in (0, 1] (got: {0})")]
    CloseFraction(f64),

    /// A fill price is zero, negative or not finite.
    #[error("price must be positive and finite (got: {0})")]
    Price(f64),

    /// The stop price is on the wrong side of the entry.
    #[error("{side:?} stop {stop} is not on the losing side of entry {entry}")]
    StopOrdering {
        /// Direction of the position.
        side: PositionSide,
        /// Entry price.
        entry: f64,
        /// Requested stop.
        stop: f64,
    },

    /// The take-profit price is on the wrong side of the entry.
    #[error("{side:?} take-profit {take_profit} is not on the winning side of entry {entry}")]
    TakeProfitOrdering {
        /// Direction of the position.
        side: PositionSide,
        /// Entry price.
        entry: f64,
        /// Requested target.
        take_profit: f64,
    },

    /// A new stop would move a trailing stop against the position.
    #[error("{side:?} trailing stop cannot loosen from {current} to {requested}")]
    LoosenTrailingStop {
        /// Direction of the position.
        side: PositionSide,
        /// Stop in place.
        current: f64,
        /// Requested stop.
        requested: f64,
    },

    /// A trailing stop was requested without a stop price to trail.
    #[error("trailing stop requires a stop price")]
    TrailingWithoutStop,

    /// No cash left to commit.
    #[error("insufficient funds: available {0}")]
    InsufficientFunds(f64),

    /// The entry has no date and the account has not processed any bar yet.
    #[error("entry date is unknown before the first bar")]
    UnknownDate,

    /// The position is not in the open set.
    #[error("position {0} is not open")]
    PositionNotOpen(u32),

    /// A partial close asks for more units than remain open.
    #[error("close of {requested} units exceeds the {remaining} units still open")]
    ExceedsRemaining {
        /// Units requested.
        requested: f64,
        /// Units open.
        remaining: f64,
    },
}
