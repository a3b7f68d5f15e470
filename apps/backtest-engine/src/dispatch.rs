//! Job dispatch: slice, simulate, store.
//!
//! Every job runs a fresh clone of a registered strategy over one partition
//! and writes the outcome to the result store. Jobs share nothing else, so
//! they can run on any worker in any order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{Level, debug, span};

use crate::data::TimeSeriesFrame;
use crate::error::{EngineError, Result};
use crate::parallel::WorkerPool;
use crate::partition::Partition;
use crate::store::{ResultKey, ResultStore};
use crate::strategy::Strategy;

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Index into the registered strategies.
    pub strategy_index: usize,
    /// Currency balances are valued in.
    pub reference_currency: String,
    /// Partition to run.
    pub partition: Partition,
}

/// First and last merged balance of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunBalanceSummary {
    /// Balance at the first traded step.
    pub start_balance: f64,
    /// Balance at the last traded step.
    pub end_balance: f64,
}

/// Balance summaries keyed by run.
pub type RunBalances = BTreeMap<ResultKey, RunBalanceSummary>;

/// Executes jobs against the registered strategies and a result store.
pub struct JobDispatcher<'a> {
    strategies: &'a [Box<dyn Strategy>],
    store: &'a ResultStore,
    pool: WorkerPool,
}

impl<'a> JobDispatcher<'a> {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(
        strategies: &'a [Box<dyn Strategy>],
        store: &'a ResultStore,
        pool: WorkerPool,
    ) -> Self {
        Self {
            strategies,
            store,
            pool,
        }
    }

    /// Run every job; the first failure aborts the batch.
    pub fn dispatch(
        &self,
        jobs: &[Job],
        price: &TimeSeriesFrame,
        volume: Option<&TimeSeriesFrame>,
    ) -> Result<RunBalances> {
        self.validate(jobs, price, volume)?;

        let summaries = self
            .pool
            .try_map(
                "dispatch",
                jobs,
                |job| self.strategy(job).map(|s| s.name().to_string()).unwrap_or_default(),
                |job| self.execute(job, price, volume),
            )?;

        Ok(summaries.into_iter().collect())
    }

    fn validate(
        &self,
        jobs: &[Job],
        price: &TimeSeriesFrame,
        volume: Option<&TimeSeriesFrame>,
    ) -> Result<()> {
        if let Some(volume) = volume {
            if volume.len() != price.len() {
                return Err(EngineError::validation(format!(
                    "volume length {} does not match price length {}",
                    volume.len(),
                    price.len()
                )));
            }
        }

        for job in jobs {
            let strategy = self.strategy(job)?;
            let range = job.partition.slice_range(strategy.lookback());
            if range.end > price.len() {
                return Err(EngineError::validation(format!(
                    "partition {} of strategy '{}' needs {} steps, series has {}",
                    job.partition,
                    strategy.name(),
                    range.end,
                    price.len()
                )));
            }
        }
        Ok(())
    }

    fn strategy(&self, job: &Job) -> Result<&dyn Strategy> {
        self.strategies
            .get(job.strategy_index)
            .map(|s| &**s)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "job references unknown strategy index {}",
                    job.strategy_index
                ))
            })
    }

    fn execute(
        &self,
        job: &Job,
        price: &TimeSeriesFrame,
        volume: Option<&TimeSeriesFrame>,
    ) -> Result<(ResultKey, RunBalanceSummary)> {
        let pristine = self.strategy(job)?;
        let _span = span!(
            Level::DEBUG,
            "job",
            strategy = pristine.name(),
            partition = %job.partition
        )
        .entered();

        let range = job.partition.slice_range(pristine.lookback());
        let price = price.slice(range.clone())?;
        let volume = volume.map(|v| v.slice(range)).transpose()?;

        let mut strategy = pristine.clone_box();
        strategy.reset();

        let strategy_error = |source: anyhow::Error| EngineError::Strategy {
            strategy: pristine.name().to_string(),
            partition: job.partition,
            source,
        };

        strategy
            .run(&price, &job.reference_currency, volume.as_ref())
            .map_err(strategy_error)?;

        let result = strategy.run_result();
        let (start_balance, end_balance) = result
            .balance_bounds()
            .ok_or_else(|| strategy_error(anyhow::anyhow!("run produced no merged total balances")))?;

        let key = ResultKey::new(pristine.name(), job.partition);
        self.store.put(&key, &result)?;

        debug!(
            start_balance,
            end_balance,
            steps = result.merged_total_balances.len(),
            "job complete"
        );

        Ok((
            key,
            RunBalanceSummary {
                start_balance,
                end_balance,
            },
        ))
    }
}
