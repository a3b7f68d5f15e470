//! Per-run sampling settings.

use serde::{Deserialize, Serialize};

use crate::partition::{LowQuotaPolicy, PartitionPlanner, RunBudget};

/// Settings for one call to `Engine::run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Currency balances are valued in.
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
    /// Smallest sampled window size.
    #[serde(default = "default_min_run_length")]
    pub min_run_length: usize,
    /// Largest sampled window size; defaults to series length minus lookback.
    #[serde(default)]
    pub max_run_length: Option<usize>,
    /// Integer budget, `all_once`, or null for every start.
    #[serde(default)]
    pub max_total_runs: RunBudget,
    /// Also run each strategy over the whole history.
    #[serde(default = "default_run_through")]
    pub run_through: bool,
    /// Window selection when the budget is below the number of window sizes.
    #[serde(default)]
    pub low_quota_policy: LowQuotaPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reference_currency: default_reference_currency(),
            min_run_length: default_min_run_length(),
            max_run_length: None,
            max_total_runs: RunBudget::Unconstrained,
            run_through: default_run_through(),
            low_quota_policy: LowQuotaPolicy::Bernoulli,
        }
    }
}

impl RunConfig {
    /// Create run settings valued in `reference_currency`.
    #[must_use]
    pub fn new(reference_currency: impl Into<String>) -> Self {
        Self {
            reference_currency: reference_currency.into(),
            ..Self::default()
        }
    }

    /// Set the window size bounds.
    #[must_use]
    pub const fn with_run_lengths(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_run_length = min;
        self.max_run_length = max;
        self
    }

    /// Set the run budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: RunBudget) -> Self {
        self.max_total_runs = budget;
        self
    }

    /// Enable or disable the runthrough partition.
    #[must_use]
    pub const fn with_run_through(mut self, run_through: bool) -> Self {
        self.run_through = run_through;
        self
    }

    /// Set the low-quota policy.
    #[must_use]
    pub const fn with_low_quota_policy(mut self, policy: LowQuotaPolicy) -> Self {
        self.low_quota_policy = policy;
        self
    }

    /// Planner for these settings.
    #[must_use]
    pub fn planner(&self) -> PartitionPlanner {
        PartitionPlanner::new(self.max_total_runs)
            .with_window_bounds(self.min_run_length, self.max_run_length)
            .with_low_quota_policy(self.low_quota_policy)
    }
}

fn default_reference_currency() -> String {
    "EUR".to_string()
}

const fn default_min_run_length() -> usize {
    1
}

const fn default_run_through() -> bool {
    true
}
