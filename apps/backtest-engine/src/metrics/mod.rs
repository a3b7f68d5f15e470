//! Risk and performance metrics over stored runs.
//!
//! Two metric sets are applied to the merged total balances of every run:
//!
//! - the standard set, annualized for daily data (252 periods per year)
//! - a custom set, supplied by the caller or the per-step default set
//!
//! Series with fewer than two balances yield `NaN` for return-based metrics.

mod analyzer;
mod constants;
mod math;
mod registry;
mod standard;

pub use analyzer::{AnalysisResults, MetricsAnalyzer, StrategyMetrics};
pub use constants::{RISK_FREE_RATE_LOG, RISK_FREE_RATE_PCT, TRADING_DAYS};
pub use math::{Drawdown, ReturnKind};
pub use registry::{MetricFn, MetricResult, MetricSet};
pub use standard::{
    default_custom_set, downside_risk, expected_rate_of_return, expected_rate_of_return_from_log,
    max_drawdown, sharpe_ratio, sortino_ratio, standard_set, total_rate_of_return, value_at_risk,
    volatility,
};
