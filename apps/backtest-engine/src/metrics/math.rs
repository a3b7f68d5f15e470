//! Statistical math utilities for metric calculations.
//!
//! Return series have one element fewer than the input. Reductions over an
//! empty slice yield `NaN`.

/// Kind of per-step return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// `x[i+1] / x[i] - 1`
    Pct,
    /// `ln(x[i+1]) - ln(x[i])`
    Log,
}

/// Per-step returns of a value series.
pub fn returns(values: &[f64], kind: ReturnKind) -> Vec<f64> {
    values
        .windows(2)
        .map(|pair| match kind {
            ReturnKind::Pct => (pair[1] - pair[0]) / pair[0],
            ReturnKind::Log => pair[1].ln() - pair[0].ln(),
        })
        .collect()
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn std_dev(values: &[f64]) -> f64 {
    let avg = mean(values);
    if avg.is_nan() {
        return f64::NAN;
    }
    let variance = values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Downside deviation below `target`, averaged over all observations.
pub fn downside_deviation(values: &[f64], target: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = values
        .iter()
        .map(|v| (v - target).min(0.0).powi(2))
        .sum();
    (sum / values.len() as f64).sqrt()
}

/// Largest relative drawdown of a value series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawdown {
    /// Absolute depth `peak_value - through_value`.
    pub depth: f64,
    /// Index of the preceding peak.
    pub peak: usize,
    /// Index of the through.
    pub through: usize,
}

/// Locate the largest relative drawdown; `None` if the series never falls
/// below its running maximum.
pub fn max_drawdown(values: &[f64]) -> Option<Drawdown> {
    let mut running_max = f64::NEG_INFINITY;
    let mut through = 0;
    let mut deepest = f64::NEG_INFINITY;
    for (i, value) in values.iter().enumerate() {
        running_max = running_max.max(*value);
        let relative = (running_max - value) / running_max;
        if relative > deepest {
            deepest = relative;
            through = i;
        }
    }
    if through == 0 {
        return None;
    }

    let mut peak = 0;
    for (i, value) in values[..through].iter().enumerate() {
        if *value > values[peak] {
            peak = i;
        }
    }

    Some(Drawdown {
        depth: values[peak] - values[through],
        peak,
        through,
    })
}
