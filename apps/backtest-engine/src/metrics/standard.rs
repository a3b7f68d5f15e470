//! Built-in metric functions and the two default metric sets.
//!
//! Every metric reduces a series of per-step balances to one number. The
//! standard set is annualized for daily data; the default custom set reports
//! per-step values.

use super::constants::{
    MIN_DOWNSIDE_RISK, RISK_FREE_RATE_LOG, RISK_FREE_RATE_PCT, TRADING_DAYS, VAR_CONFIDENCE,
};
use super::math::{self, ReturnKind};
use super::registry::MetricSet;

/// Total rate of return `last / first - 1`, optionally annualized over
/// `period_length` steps.
pub fn total_rate_of_return(balances: &[f64], period_length: Option<f64>) -> f64 {
    let (Some(first), Some(last)) = (balances.first(), balances.last()) else {
        return f64::NAN;
    };
    let total = last / first - 1.0;
    match period_length {
        Some(period) => (1.0 + total).powf(TRADING_DAYS / period) - 1.0,
        None => total,
    }
}

/// Standard deviation of returns scaled by `sqrt(annualization)`.
pub fn volatility(balances: &[f64], kind: ReturnKind, annualization: f64) -> f64 {
    annualization.sqrt() * math::std_dev(&math::returns(balances, kind))
}

/// Mean excess return over `reference_rate`.
pub fn expected_rate_of_return(balances: &[f64], kind: ReturnKind, reference_rate: f64) -> f64 {
    let excess: Vec<f64> = math::returns(balances, kind)
        .into_iter()
        .map(|r| r - reference_rate)
        .collect();
    math::mean(&excess)
}

/// Mean simple return, computed through log returns.
pub fn expected_rate_of_return_from_log(balances: &[f64]) -> f64 {
    let simple: Vec<f64> = math::returns(balances, ReturnKind::Log)
        .into_iter()
        .map(f64::exp_m1)
        .collect();
    math::mean(&simple)
}

/// Downside deviation of returns below `target`.
pub fn downside_risk(balances: &[f64], kind: ReturnKind, target: f64) -> f64 {
    math::downside_deviation(&math::returns(balances, kind), target)
}

/// Historic value at risk at [`VAR_CONFIDENCE`], scaled by `sqrt(annualization)`.
pub fn value_at_risk(balances: &[f64], kind: ReturnKind, annualization: f64) -> f64 {
    annualization.sqrt() * math::quantile(&math::returns(balances, kind), 1.0 - VAR_CONFIDENCE)
}

/// Sharpe ratio on simple returns against a constant risk-free rate.
///
/// The denominator is the deviation of excess returns. Zero deviation
/// yields `0.0`.
pub fn sharpe_ratio(balances: &[f64], risk_free_rate: f64, annualization: f64) -> f64 {
    let excess: Vec<f64> = math::returns(balances, ReturnKind::Pct)
        .into_iter()
        .map(|r| r - risk_free_rate)
        .collect();
    let deviation = math::std_dev(&excess);
    if deviation == 0.0 {
        return 0.0;
    }
    annualization.sqrt() * math::mean(&excess) / deviation
}

/// Sortino ratio on simple returns.
///
/// Zero when downside risk is negligible, which includes runs too short to
/// have any return.
pub fn sortino_ratio(balances: &[f64], target_rate: f64, annualization: f64) -> f64 {
    let rets = math::returns(balances, ReturnKind::Pct);
    let down = math::downside_deviation(&rets, target_rate);
    if down > MIN_DOWNSIDE_RISK {
        annualization.sqrt() * (math::mean(&rets) - target_rate) / down
    } else {
        0.0
    }
}

/// Absolute depth of the largest relative drawdown; zero if there is none.
pub fn max_drawdown(balances: &[f64]) -> f64 {
    math::max_drawdown(balances).map_or(0.0, |dd| dd.depth)
}

/// Annualized metric set applied to every run.
#[must_use]
pub fn standard_set() -> MetricSet {
    MetricSet::new()
        .with_value("total_rate_of_return", |b| {
            total_rate_of_return(b, Some(b.len() as f64))
        })
        .with_value("volatility", |b| volatility(b, ReturnKind::Pct, TRADING_DAYS))
        .with_value("expected_rate_of_return", expected_rate_of_return_from_log)
        .with_value("expected_rate_of_log_return", |b| {
            expected_rate_of_return(b, ReturnKind::Log, 0.0)
        })
        .with_value("sharpe_ratio", |b| sharpe_ratio(b, RISK_FREE_RATE_PCT, TRADING_DAYS))
        .with_value("sortino_ratio", |b| sortino_ratio(b, RISK_FREE_RATE_PCT, TRADING_DAYS))
        .with_value("value_at_risk", |b| value_at_risk(b, ReturnKind::Pct, TRADING_DAYS))
        .with_value("max_drawdown", max_drawdown)
}

/// Per-step metric set used when no custom set is supplied.
#[must_use]
pub fn default_custom_set() -> MetricSet {
    MetricSet::new()
        .with_value("total_rate_of_return", |b| total_rate_of_return(b, None))
        .with_value("volatility", |b| volatility(b, ReturnKind::Log, 1.0))
        .with_value("downside_risk", |b| {
            downside_risk(b, ReturnKind::Log, RISK_FREE_RATE_LOG)
        })
        .with_value("value_at_risk", |b| value_at_risk(b, ReturnKind::Log, 1.0))
        .with_value("expected_rate_of_return", |b| {
            expected_rate_of_return(b, ReturnKind::Log, RISK_FREE_RATE_LOG)
        })
        .with_value("sharpe_ratio", |b| sharpe_ratio(b, RISK_FREE_RATE_PCT, 1.0))
        .with_value("sortino_ratio", |b| sortino_ratio(b, RISK_FREE_RATE_PCT, 1.0))
        .with_value("max_drawdown", max_drawdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const BALANCES: [f64; 5] = [100.0, 102.0, 99.0, 104.0, 103.0];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_total_rate_of_return() {
        assert!(approx(total_rate_of_return(&BALANCES, None), 0.03));
        let annual = total_rate_of_return(&BALANCES, Some(5.0));
        assert!(approx(annual, 1.03_f64.powf(252.0 / 5.0) - 1.0));
        assert!(approx(total_rate_of_return(&[50.0], None), 0.0));
    }

    #[test]
    fn test_expected_returns_agree() {
        let from_log = expected_rate_of_return_from_log(&BALANCES);
        let simple = expected_rate_of_return(&BALANCES, ReturnKind::Pct, 0.0);
        assert!(approx(from_log, simple));
    }

    #[test]
    fn test_flat_series() {
        let flat = [10.0; 6];
        assert!(approx(sharpe_ratio(&flat, RISK_FREE_RATE_PCT, TRADING_DAYS), 0.0));
        assert!(approx(sortino_ratio(&flat, 0.0, TRADING_DAYS), 0.0));
        assert!(approx(volatility(&flat, ReturnKind::Pct, TRADING_DAYS), 0.0));
        assert!(approx(max_drawdown(&flat), 0.0));
    }

    #[test]
    fn test_sortino_positive_for_gains_with_dips() {
        let ratio = sortino_ratio(&BALANCES, 0.0, 1.0);
        assert!(ratio > 0.0);
    }

    #[test]
    fn test_sortino_single_balance_is_zero() {
        assert!(approx(sortino_ratio(&[100.0], 0.0, TRADING_DAYS), 0.0));
        assert!(approx(sortino_ratio(&[], RISK_FREE_RATE_PCT, 1.0), 0.0));
    }

    #[test]
    fn test_sharpe_zero_deviation_is_zero() {
        // every return is exactly 1.0
        let steady = [1.0, 2.0, 4.0, 8.0];
        assert!(approx(sharpe_ratio(&steady, 0.0, TRADING_DAYS), 0.0));
    }

    #[test]
    fn test_max_drawdown_depth() {
        assert!(approx(max_drawdown(&BALANCES), 3.0));
    }

    #[test_case("volatility" ; "volatility")]
    #[test_case("sharpe_ratio" ; "sharpe")]
    #[test_case("value_at_risk" ; "var")]
    #[test_case("expected_rate_of_log_return" ; "log return")]
    fn test_single_balance_is_nan(metric: &str) {
        let set = standard_set();
        let Some(f) = set.get(metric) else {
            panic!("metric '{metric}' missing");
        };
        let Ok(value) = f(&[100.0][..]) else {
            panic!("metric '{metric}' should not error");
        };
        assert!(value.is_nan());
    }

    #[test]
    fn test_set_names() {
        assert_eq!(standard_set().len(), 8);
        let names = default_custom_set().metric_names();
        assert!(names.contains(&"downside_risk".to_string()));
        assert!(!names.contains(&"expected_rate_of_log_return".to_string()));
    }
}
