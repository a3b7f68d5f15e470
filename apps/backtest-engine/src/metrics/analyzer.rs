//! Reduction of stored runs to metric tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::parallel::WorkerPool;
use crate::partition::Partition;
use crate::store::{ResultKey, ResultStore};

use super::registry::{MetricResult, MetricSet};
use super::standard::{default_custom_set, standard_set};

/// `strategy -> partition -> metric name -> value`.
pub type StrategyMetrics = BTreeMap<String, BTreeMap<Partition, MetricResult>>;

/// Output of one analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    /// Standard annualized metrics.
    #[serde(deserialize_with = "deserialize_metrics")]
    pub standard: StrategyMetrics,
    /// Custom metrics.
    #[serde(deserialize_with = "deserialize_metrics")]
    pub custom: StrategyMetrics,
}

impl AnalysisResults {
    /// Mean of one standard metric over every partition of a strategy,
    /// ignoring `NaN` values.
    #[must_use]
    pub fn standard_mean(&self, strategy: &str, metric: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .standard
            .get(strategy)?
            .values()
            .filter_map(|result| result.get(metric).copied())
            .filter(|v| !v.is_nan())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// JSON has no NaN; serde_json writes it as null.
fn deserialize_metrics<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StrategyMetrics, D::Error> {
    let raw = BTreeMap::<String, BTreeMap<Partition, BTreeMap<String, Option<f64>>>>::deserialize(
        deserializer,
    )?;
    Ok(raw
        .into_iter()
        .map(|(strategy, partitions)| {
            let partitions = partitions
                .into_iter()
                .map(|(partition, values)| {
                    let values = values
                        .into_iter()
                        .map(|(name, value)| (name, value.unwrap_or(f64::NAN)))
                        .collect();
                    (partition, values)
                })
                .collect();
            (strategy, partitions)
        })
        .collect())
}

/// Applies the standard and custom metric sets to every stored run.
#[derive(Debug, Clone)]
pub struct MetricsAnalyzer {
    standard: MetricSet,
    custom: MetricSet,
    pool: WorkerPool,
}

impl MetricsAnalyzer {
    /// Create an analyzer. Without a custom set the default one is used.
    #[must_use]
    pub fn new(custom: Option<MetricSet>, pool: WorkerPool) -> Self {
        Self {
            standard: standard_set(),
            custom: custom.unwrap_or_else(default_custom_set),
            pool,
        }
    }

    /// Standard metric set.
    #[must_use]
    pub const fn standard_set(&self) -> &MetricSet {
        &self.standard
    }

    /// Custom metric set.
    #[must_use]
    pub const fn custom_set(&self) -> &MetricSet {
        &self.custom
    }

    /// Evaluate every stored run. The first metric error aborts the pass.
    pub fn analyze(&self, store: &ResultStore) -> Result<AnalysisResults> {
        let keys = store.keys()?;
        let owner = |key: &ResultKey| key.strategy.clone();
        let evaluated = self.pool.try_map("analyze", &keys, owner, |key| {
            let run = store.get(key)?;
            let balances = &run.merged_total_balances;
            Ok((
                key.clone(),
                apply(&self.standard, key, balances)?,
                apply(&self.custom, key, balances)?,
            ))
        })?;

        let mut results = AnalysisResults::default();
        for (key, standard, custom) in evaluated {
            results
                .standard
                .entry(key.strategy.clone())
                .or_default()
                .insert(key.partition, standard);
            results
                .custom
                .entry(key.strategy.clone())
                .or_default()
                .insert(key.partition, custom);
        }

        info!(
            runs = keys.len(),
            strategies = results.standard.len(),
            custom_metrics = self.custom.len(),
            "analysis complete"
        );
        Ok(results)
    }
}

fn apply(set: &MetricSet, key: &ResultKey, balances: &[f64]) -> Result<MetricResult> {
    set.iter()
        .map(|(name, metric)| {
            metric(balances)
                .map(|value| (name.to_string(), value))
                .map_err(|source| EngineError::Metric {
                    metric: name.to_string(),
                    strategy: key.strategy.clone(),
                    partition: key.partition,
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::parallel::Concurrency;
    use crate::partition::StartIndex;
    use crate::strategy::RunResult;
    use tempfile::{TempDir, tempdir};

    fn store_with_runs() -> (TempDir, ResultStore) {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Ok(store) = ResultStore::create(dir.path(), "analyze") else {
            panic!("store should be created");
        };
        let runs = [
            ("alpha", Partition::new(3, StartIndex::At(0)), vec![100.0, 101.0, 99.0]),
            ("alpha", Partition::new(3, StartIndex::Runthrough), vec![100.0, 105.0, 110.0]),
            ("beta", Partition::new(2, StartIndex::At(4)), vec![50.0, 45.0]),
        ];
        for (strategy, partition, balances) in runs {
            let result = RunResult {
                merged_total_balances: balances,
                ..RunResult::default()
            };
            if let Err(e) = store.put(&ResultKey::new(strategy, partition), &result) {
                panic!("put failed: {e}");
            }
        }
        (dir, store)
    }

    #[test]
    fn test_every_run_analyzed() {
        let (_dir, store) = store_with_runs();
        let Ok(pool) = Concurrency::from_n_jobs(2).map(WorkerPool::new) else {
            panic!("pool should be valid");
        };
        let analyzer = MetricsAnalyzer::new(None, pool);
        let Ok(results) = analyzer.analyze(&store) else {
            panic!("analysis should succeed");
        };

        assert_eq!(results.standard.get("alpha").map(BTreeMap::len), Some(2));
        assert_eq!(results.custom.get("beta").map(BTreeMap::len), Some(1));

        let beta = &results.custom["beta"][&Partition::new(2, StartIndex::At(4))];
        assert!((beta["total_rate_of_return"] + 0.1).abs() < 1e-12);
        assert!((beta["max_drawdown"] - 5.0).abs() < 1e-12);
        assert_eq!(beta.len(), analyzer.custom_set().len());
    }

    #[test]
    fn test_custom_set_replaces_default() {
        let (_dir, store) = store_with_runs();
        let custom = MetricSet::new().with_value("final", |b| b.last().copied().unwrap_or(f64::NAN));
        let analyzer = MetricsAnalyzer::new(Some(custom), WorkerPool::default());
        let Ok(results) = analyzer.analyze(&store) else {
            panic!("analysis should succeed");
        };
        let alpha = &results.custom["alpha"][&Partition::new(3, StartIndex::Runthrough)];
        assert_eq!(alpha.len(), 1);
        assert!((alpha["final"] - 110.0).abs() < f64::EPSILON);
        assert_eq!(analyzer.standard_set().len(), 8);
    }

    #[test]
    fn test_metric_error_aborts() {
        let (_dir, store) = store_with_runs();
        let custom = MetricSet::new().with("picky", |b: &[f64]| {
            if b.len() < 3 {
                anyhow::bail!("too short");
            }
            Ok(0.0)
        });
        let analyzer = MetricsAnalyzer::new(Some(custom), WorkerPool::default());
        let Err(err) = analyzer.analyze(&store) else {
            panic!("analysis should fail");
        };
        assert_eq!(err.code(), ErrorCode::MetricFailed);
        assert!(err.to_string().contains("picky"));
    }

    #[test]
    fn test_results_round_trip_with_nan() {
        let mut results = AnalysisResults::default();
        results.standard.entry("alpha".to_string()).or_default().insert(
            Partition::new(1, StartIndex::At(0)),
            MetricResult::from([("volatility".to_string(), f64::NAN), ("max_drawdown".to_string(), 0.0)]),
        );
        let Ok(json) = serde_json::to_string(&results) else {
            panic!("serialize failed");
        };
        let Ok(back) = serde_json::from_str::<AnalysisResults>(&json) else {
            panic!("deserialize failed");
        };
        let values = &back.standard["alpha"][&Partition::new(1, StartIndex::At(0))];
        assert!(values["volatility"].is_nan());
        assert!(values["max_drawdown"].abs() < f64::EPSILON);
    }

    #[test]
    fn test_standard_mean_skips_nan() {
        let mut results = AnalysisResults::default();
        let partitions = results.standard.entry("s".to_string()).or_default();
        for (start, value) in [(0, 1.0), (1, 3.0), (2, f64::NAN)] {
            partitions.insert(
                Partition::new(2, StartIndex::At(start)),
                MetricResult::from([("sharpe_ratio".to_string(), value)]),
            );
        }
        assert_eq!(results.standard_mean("s", "sharpe_ratio"), Some(2.0));
        assert_eq!(results.standard_mean("s", "missing"), None);
        assert_eq!(results.standard_mean("other", "sharpe_ratio"), None);
    }
}
