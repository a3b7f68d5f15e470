//! Fail-fast batch executor using Rayon.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{Level, debug, info, span};

use crate::error::{EngineError, Result};

use super::concurrency::Concurrency;
use super::progress::{Progress, ProgressTracker};

/// Runs a batch of independent jobs and collects their results.
///
/// Each batch gets its own thread pool sized by [`Concurrency`], so the
/// global Rayon pool is never reconfigured. The first job error aborts the
/// batch and is returned; remaining jobs are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool {
    concurrency: Concurrency,
    track_progress: bool,
}

impl WorkerPool {
    /// Create a worker pool.
    #[must_use]
    pub const fn new(concurrency: Concurrency) -> Self {
        Self {
            concurrency,
            track_progress: true,
        }
    }

    /// Enable or disable per-strategy progress logging.
    #[must_use]
    pub const fn with_progress(mut self, track_progress: bool) -> Self {
        self.track_progress = track_progress;
        self
    }

    /// Configured concurrency.
    #[must_use]
    pub const fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Apply `job` to every item, in parallel when configured.
    ///
    /// `owner` names the strategy an item belongs to; progress is counted per
    /// strategy. Output order matches input order.
    pub fn try_map<T, U, O, F>(&self, batch: &str, items: &[T], owner: O, job: F) -> Result<Vec<U>>
    where
        T: Sync,
        U: Send,
        O: Fn(&T) -> String,
        F: Fn(&T) -> Result<U> + Send + Sync,
    {
        if items.is_empty() {
            debug!(batch, "empty batch, nothing to execute");
            return Ok(Vec::new());
        }

        let tracker = ProgressTracker::new(items.iter().map(owner).collect());
        let start_time = Instant::now();
        let threads = self.concurrency.threads_for(items.len());

        info!(
            batch,
            jobs = items.len(),
            threads = threads.unwrap_or(1),
            "starting batch"
        );

        let run_one = |(index, item): (usize, &T)| -> Result<U> {
            let output = job(item)?;
            if let Some(strategy) = tracker.record(index) {
                if self.track_progress {
                    log_strategy_done(batch, strategy, &tracker.snapshot());
                }
            }
            Ok(output)
        };

        let results = match threads {
            None => items.iter().enumerate().map(run_one).collect::<Result<Vec<U>>>(),
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("backtest-worker-{i}"))
                    .build()
                    .map_err(|e| EngineError::WorkerPool {
                        message: e.to_string(),
                    })?;
                pool.install(|| {
                    let _span = span!(Level::DEBUG, "worker_batch", batch).entered();
                    items
                        .par_iter()
                        .enumerate()
                        .map(run_one)
                        .collect::<Result<Vec<U>>>()
                })
            }
        };

        let progress = tracker.snapshot();
        match &results {
            Ok(_) => info!(
                batch,
                completed = progress.completed,
                strategies = progress.per_strategy.len(),
                elapsed_secs = start_time.elapsed().as_secs_f64(),
                "batch complete"
            ),
            Err(e) => info!(
                batch,
                completed = progress.completed,
                total = progress.total,
                strategies_done = progress.strategies_done(),
                error = %e,
                "batch aborted"
            ),
        }

        results
    }
}

fn log_strategy_done(batch: &str, strategy: &str, progress: &Progress) {
    debug!(
        batch,
        strategy,
        strategies_done = progress.strategies_done(),
        strategies = progress.per_strategy.len(),
        "Strategy finished: {:.1}% of batch ({}/{})",
        progress.percentage(),
        progress.completed,
        progress.total
    );
}
