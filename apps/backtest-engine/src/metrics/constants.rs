//! Constants for metric calculations. Daily data is assumed.

/// Trading days per year, used for annualization.
pub const TRADING_DAYS: f64 = 252.0;
/// Daily simple risk-free rate equivalent to 3% per year.
pub const RISK_FREE_RATE_PCT: f64 = 0.000_117_303_7;
/// Daily log risk-free rate equivalent to 3% per year.
pub const RISK_FREE_RATE_LOG: f64 = 0.000_117_296_8;
/// Confidence level for value at risk.
pub const VAR_CONFIDENCE: f64 = 0.95;
/// Downside risk at or below this yields a sortino ratio of zero.
pub const MIN_DOWNSIDE_RISK: f64 = 0.0001;
