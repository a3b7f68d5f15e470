//! Strategy interface consumed by the engine.
//!
//! The engine knows nothing about trading logic. A strategy receives a price
//! slice (and optionally a volume slice), simulates over it, and exposes the
//! resulting [`RunResult`]. Each job works on its own clone of the registered
//! strategy, so no state leaks between partitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::TimeSeriesFrame;

/// Output of one strategy run over one partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Per-step decision tags.
    pub signals: Vec<Vec<String>>,
    /// Per-asset position series.
    pub positions: BTreeMap<String, Vec<f64>>,
    /// Per-asset positions merged across sub-accounts.
    pub merged_positions: BTreeMap<String, Vec<f64>>,
    /// Per-step total valuation.
    pub total_balances: Vec<f64>,
    /// Per-step total valuation merged across sub-accounts.
    pub merged_total_balances: Vec<f64>,
}

impl RunResult {
    /// First and last merged balance, if any.
    #[must_use]
    pub fn balance_bounds(&self) -> Option<(f64, f64)> {
        Some((
            *self.merged_total_balances.first()?,
            *self.merged_total_balances.last()?,
        ))
    }
}

/// A pluggable trading strategy.
pub trait Strategy: StrategyClone + Send + Sync {
    /// Unique, filesystem-safe name.
    fn name(&self) -> &str;

    /// Number of warm-up steps needed before the first decision.
    fn lookback(&self) -> usize;

    /// Simulate over the given slices.
    fn run(
        &mut self,
        price: &TimeSeriesFrame,
        reference_currency: &str,
        volume: Option<&TimeSeriesFrame>,
    ) -> anyhow::Result<()>;

    /// Result of the last [`Strategy::run`].
    fn run_result(&self) -> RunResult;

    /// Clear all state from a previous run.
    fn reset(&mut self);

    /// Optional description of the decision logic, recorded as metadata.
    fn source(&self) -> Option<String> {
        None
    }
}

/// Object-safe cloning for boxed strategies.
pub trait StrategyClone {
    /// Clone into a new box.
    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl<T> StrategyClone for T
where
    T: Strategy + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for dyn Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name())
            .field("lookback", &self.lookback())
            .finish()
    }
}

/// Buy at the first decision step and hold a single series.
///
/// Balance at each step is `cash_after_entry + units * price`.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    name: String,
    lookback: usize,
    initial_balance: f64,
    result: RunResult,
}

impl BuyAndHold {
    /// Create a buy-and-hold strategy.
    #[must_use]
    pub fn new(name: impl Into<String>, lookback: usize, initial_balance: f64) -> Self {
        Self {
            name: name.into(),
            lookback,
            initial_balance,
            result: RunResult::default(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.lookback
    }

    fn run(
        &mut self,
        price: &TimeSeriesFrame,
        reference_currency: &str,
        _volume: Option<&TimeSeriesFrame>,
    ) -> anyhow::Result<()> {
        let (key, series) = price
            .iter()
            .find(|(key, _)| key.quote == reference_currency)
            .ok_or_else(|| anyhow::anyhow!("no series quoted in {reference_currency}"))?;

        let traded = series
            .get(self.lookback..)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("slice shorter than lookback {}", self.lookback))?;

        let entry = traded[0];
        if entry <= 0.0 {
            anyhow::bail!("non-positive entry price {entry}");
        }
        let units = self.initial_balance / entry;
        let balances: Vec<f64> = traded.iter().map(|p| units * p).collect();

        self.result = RunResult {
            signals: traded
                .iter()
                .enumerate()
                .map(|(i, _)| vec![if i == 0 { "buy" } else { "hold" }.to_string()])
                .collect(),
            positions: BTreeMap::from([(key.base.clone(), vec![units; traded.len()])]),
            merged_positions: BTreeMap::from([(key.base.clone(), vec![units; traded.len()])]),
            total_balances: balances.clone(),
            merged_total_balances: balances,
        };
        Ok(())
    }

    fn run_result(&self) -> RunResult {
        self.result.clone()
    }

    fn reset(&mut self) {
        self.result = RunResult::default();
    }

    fn source(&self) -> Option<String> {
        Some(format!(
            "buy_and_hold(lookback={}, initial_balance={})",
            self.lookback, self.initial_balance
        ))
    }
}
