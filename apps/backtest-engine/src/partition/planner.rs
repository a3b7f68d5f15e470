//! Randomized window sampling.
//!
//! For each window size `w` in `[min_window, max_window]` the planner picks
//! unique start indices from `[0, L - lookback - w]`, subject to a
//! [`RunBudget`]. All randomness comes from the caller's RNG, consumed in
//! ascending window order, so a seeded RNG gives a reproducible plan.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::index;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

use super::types::{LowQuotaPolicy, RunBudget};

/// Sampled start indices keyed by window size.
pub type WindowPlan = BTreeMap<usize, Vec<usize>>;

/// Sampling constraints for one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlanner {
    /// Smallest window size.
    pub min_window: usize,
    /// Largest window size; `None` means `L - lookback`.
    pub max_window: Option<usize>,
    /// Run budget per strategy.
    pub budget: RunBudget,
    /// Policy when the budget is below the number of window sizes.
    pub low_quota_policy: LowQuotaPolicy,
}

impl Default for PartitionPlanner {
    fn default() -> Self {
        Self {
            min_window: 1,
            max_window: None,
            budget: RunBudget::Unconstrained,
            low_quota_policy: LowQuotaPolicy::Bernoulli,
        }
    }
}

impl PartitionPlanner {
    /// Create a planner with default window bounds.
    #[must_use]
    pub fn new(budget: RunBudget) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    /// Set the window size bounds.
    #[must_use]
    pub const fn with_window_bounds(mut self, min_window: usize, max_window: Option<usize>) -> Self {
        self.min_window = min_window;
        self.max_window = max_window;
        self
    }

    /// Set the low-quota policy.
    #[must_use]
    pub const fn with_low_quota_policy(mut self, policy: LowQuotaPolicy) -> Self {
        self.low_quota_policy = policy;
        self
    }

    /// Sample start indices for a series of `series_len` steps and a strategy
    /// that needs `lookback` warm-up steps.
    ///
    /// Returned starts are sorted and unique within each window.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        series_len: usize,
        lookback: usize,
        rng: &mut R,
    ) -> Result<WindowPlan> {
        let effective = series_len.saturating_sub(lookback);
        if effective == 0 {
            return Err(EngineError::validation(format!(
                "series length {series_len} must exceed lookback {lookback}"
            )));
        }
        let max_window = match self.max_window {
            Some(max) if max > effective => {
                warn!(
                    requested = max,
                    clamped = effective,
                    series_len,
                    lookback,
                    "max window exceeds series length minus lookback, clamping"
                );
                effective
            }
            Some(max) => max,
            None => effective,
        };

        if self.min_window > max_window {
            return Err(EngineError::validation(format!(
                "min window {} exceeds max window {max_window}",
                self.min_window
            )));
        }

        let windows = self.min_window..=max_window;
        let num_windows = max_window - self.min_window + 1;
        let possible_starts = |window: usize| effective - window + 1;

        let mut plan = WindowPlan::new();
        match self.budget {
            RunBudget::Unconstrained => {
                for window in windows {
                    plan.insert(window, (0..possible_starts(window)).collect());
                }
            }
            RunBudget::AllOnce => {
                for window in windows {
                    plan.insert(window, vec![rng.random_range(0..possible_starts(window))]);
                }
            }
            RunBudget::Total(total) => {
                let quota = total / num_windows as u64;
                if quota < 1 {
                    self.plan_low_quota(&mut plan, total, num_windows, &possible_starts, rng);
                } else {
                    let mut short = 0_usize;
                    for window in windows {
                        let possible = possible_starts(window);
                        let count = usize::try_from(quota).map_or(possible, |q| q.min(possible));
                        if (count as u64) < quota {
                            short += 1;
                        }
                        let mut starts = index::sample(&mut *rng, possible, count).into_vec();
                        starts.sort_unstable();
                        plan.insert(window, starts);
                    }
                    if short > 0 {
                        warn!(
                            quota,
                            windows_short = short,
                            "some window sizes have fewer possible starts than the per-window quota"
                        );
                    }
                }
            }
        }

        debug!(
            min_window = self.min_window,
            max_window,
            budget = %self.budget,
            windows = plan.len(),
            runs = plan.values().map(Vec::len).sum::<usize>(),
            "partition plan ready"
        );

        Ok(plan)
    }

    fn plan_low_quota<R, F>(
        &self,
        plan: &mut WindowPlan,
        total: u64,
        num_windows: usize,
        possible_starts: &F,
        rng: &mut R,
    ) where
        R: Rng + ?Sized,
        F: Fn(usize) -> usize,
    {
        // total < num_windows here, so the conversion cannot truncate
        let total = total as usize;
        match self.low_quota_policy {
            LowQuotaPolicy::Bernoulli => {
                let probability = total as f64 / num_windows as f64;
                let mut included = 0_usize;
                for window in self.min_window..self.min_window + num_windows {
                    if included < total && rng.random_bool(probability) {
                        included += 1;
                        plan.insert(window, vec![rng.random_range(0..possible_starts(window))]);
                    }
                }
            }
            LowQuotaPolicy::EvenlySpaced => {
                for i in 0..total {
                    let window = self.min_window + i * num_windows / total;
                    plan.insert(window, vec![rng.random_range(0..possible_starts(window))]);
                }
            }
        }
    }
}

/// Window size of the full-history runthrough partition.
pub fn runthrough_window(series_len: usize, lookback: usize) -> Result<usize> {
    match series_len.checked_sub(lookback) {
        Some(window) if window > 0 => Ok(window),
        _ => Err(EngineError::validation(format!(
            "series length {series_len} must exceed lookback {lookback}"
        ))),
    }
}
