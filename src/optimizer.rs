//! Strategy parameter optimization.
//!
//! This module runs the same strategy over the same bars once per parameter combination. The
//! `ParameterCombination` trait defines the combinations and `Optimizer` executes an independent
//! backtest, with its own account, for each of them.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::engine::{Account, Backtest, Bar};
use crate::errors::{Error, Result};

use rayon::prelude::*;

/// Trait defining how to generate parameter combinations for optimization.
///
/// The associated type `Output` represents a single parameter combination (e.g., a tuple of values).
pub trait ParameterCombination: Sync {
    /// Type representing a single parameter combination (e.g., `(usize, f64)`).
    type Output: Clone + Send + Sync;

    /// Generates all parameter combinations to test.
    fn generate() -> Vec<Self::Output>;
}

/// Optimizer for testing a strategy with different parameter combinations.
pub struct Optimizer<PC: ParameterCombination> {
    data: Arc<[Bar]>,
    initial_capital: f64,
    _marker: PhantomData<PC>,
}

impl<PC: ParameterCombination> From<&Backtest> for Optimizer<PC> {
    fn from(value: &Backtest) -> Self {
        Self {
            _marker: PhantomData,
            data: value.bars().copied().collect(),
            initial_capital: value.initial_capital(),
        }
    }
}

impl<PC: ParameterCombination> Optimizer<PC> {
    /// Creates a new `Optimizer` with the given bars and initial capital.
    ///
    /// ### Arguments
    /// * `data` - Bars shared by every run.
    /// * `initial_capital` - Starting cash of every run.
    pub fn new(data: Arc<[Bar]>, initial_capital: f64) -> Self {
        Self {
            data,
            initial_capital,
            _marker: PhantomData,
        }
    }

    /// Runs the strategy for every parameter combination.
    ///
    /// Combinations are split into one chunk per CPU. Each chunk owns a `Backtest`, and every run
    /// starts from a fresh account. `strategy` is shared by the chunks, so per-run state belongs in
    /// the value built by `combinator`.
    ///
    /// ### Arguments
    /// * `combinator` - Builds the strategy state (indicators, thresholds) from a combination.
    /// * `strategy` - Strategy callback, receiving the state built by `combinator`.
    ///
    /// ### Returns
    /// Each combination with the account value at the last close, or the first error raised.
    pub fn with<T, C, S>(&self, combinator: C, strategy: S) -> Result<Vec<(PC::Output, f64)>>
    where
        C: Fn(&PC::Output) -> Result<T> + Sync,
        S: Fn(&mut Account, &mut T, &[Bar]) -> Result<()> + Sync,
    {
        let final_close = self
            .data
            .last()
            .ok_or(Error::Msg("No bars to optimize on".to_string()))?
            .close()?;
        let num_cpus = num_cpus::get();
        let combinations = PC::generate();
        let chunk_size = combinations.len().div_ceil(num_cpus).max(1);

        combinations
            .par_chunks(chunk_size)
            .map::<_, Result<_>>(|par_combinations| {
                let mut backtest = Backtest::new(Arc::clone(&self.data), self.initial_capital)?;
                let mut local_results = Vec::with_capacity(par_combinations.len());

                for param_set in par_combinations {
                    let mut state = combinator(param_set)?;
                    backtest.run(|account, lookback| strategy(account, &mut state, lookback))?;
                    local_results.push((param_set.clone(), backtest.total_value(final_close)));
                }

                Ok(local_results)
            })
            .collect::<Result<Vec<_>>>()
            .map(|chunks| chunks.into_iter().flatten().collect())
    }
}
