//! Named metric collections.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A metric: reduces a balance series to one value.
pub type MetricFn = Arc<dyn Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync>;

/// Metric values of one run, keyed by metric name.
pub type MetricResult = BTreeMap<String, f64>;

/// A named set of metrics, iterated in name order.
#[derive(Clone, Default)]
pub struct MetricSet {
    metrics: BTreeMap<String, MetricFn>,
}

impl MetricSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fallible metric, replacing any metric of the same name.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, metric: F) -> Self
    where
        F: Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        self.insert(name, metric);
        self
    }

    /// Add an infallible metric, replacing any metric of the same name.
    #[must_use]
    pub fn with_value<F>(self, name: impl Into<String>, metric: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.with(name, move |balances| Ok(metric(balances)))
    }

    /// Add a fallible metric in place. Returns `true` if a metric was replaced.
    pub fn insert<F>(&mut self, name: impl Into<String>, metric: F) -> bool
    where
        F: Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        self.metrics.insert(name.into(), Arc::new(metric)).is_some()
    }

    /// Look up a metric by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricFn> {
        self.metrics.get(name)
    }

    /// Metric names in iteration order.
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.keys().cloned().collect()
    }

    /// Iterate over `(name, metric)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricFn)> {
        self.metrics.iter().map(|(name, f)| (name.as_str(), f))
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether the set has no metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSet")
            .field("metrics", &self.metrics.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_replace() {
        let mut set = MetricSet::new().with_value("first", |b| b[0]);
        assert!(!set.insert("last", |b: &[f64]| {
            b.last().copied().ok_or_else(|| anyhow::anyhow!("empty"))
        }));
        assert!(set.insert("first", |_: &[f64]| Ok(0.0)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.metric_names(), vec!["first".to_string(), "last".to_string()]);

        let Some(last) = set.get("last") else {
            panic!("metric missing");
        };
        assert!(last(&[] as &[f64]).is_err());
        assert!(matches!(last(&[1.0, 2.0][..]), Ok(v) if (v - 2.0).abs() < f64::EPSILON));
    }
}
