//! Index of every partition run in the current engine run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::planner::WindowPlan;
use super::types::{Partition, StartIndex};

/// `strategy -> window_size -> start indices` for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRegister {
    entries: BTreeMap<String, BTreeMap<usize, BTreeSet<StartIndex>>>,
}

impl RunRegister {
    /// Create an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one partition for a strategy. Returns `false` if it was already present.
    pub fn insert(&mut self, strategy: &str, partition: Partition) -> bool {
        self.entries
            .entry(strategy.to_string())
            .or_default()
            .entry(partition.window_size)
            .or_default()
            .insert(partition.start_index)
    }

    /// Record every sampled start of a plan.
    pub fn insert_plan(&mut self, strategy: &str, plan: &WindowPlan) {
        for (window, starts) in plan {
            for start in starts {
                self.insert(strategy, Partition::new(*window, StartIndex::At(*start)));
            }
        }
    }

    /// Whether the partition was run for this strategy.
    #[must_use]
    pub fn contains(&self, strategy: &str, partition: &Partition) -> bool {
        self.entries
            .get(strategy)
            .and_then(|windows| windows.get(&partition.window_size))
            .is_some_and(|starts| starts.contains(&partition.start_index))
    }

    /// Registered strategy names.
    pub fn strategies(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Window sizes run for a strategy, ascending.
    pub fn windows(&self, strategy: &str) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .get(strategy)
            .into_iter()
            .flat_map(|windows| windows.keys().copied())
    }

    /// All partitions of one strategy in `(window, start)` order.
    pub fn partitions(&self, strategy: &str) -> impl Iterator<Item = Partition> + '_ {
        self.entries.get(strategy).into_iter().flat_map(|windows| {
            windows.iter().flat_map(|(window, starts)| {
                starts.iter().map(|start| Partition::new(*window, *start))
            })
        })
    }

    /// Every `(strategy, partition)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Partition)> {
        self.entries.iter().flat_map(|(strategy, windows)| {
            windows.iter().flat_map(move |(window, starts)| {
                starts
                    .iter()
                    .map(move |start| (strategy.as_str(), Partition::new(*window, *start)))
            })
        })
    }

    /// Number of partitions run for a strategy.
    #[must_use]
    pub fn count(&self, strategy: &str) -> usize {
        self.entries
            .get(strategy)
            .map_or(0, |windows| windows.values().map(BTreeSet::len).sum())
    }

    /// Total number of partitions across all strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum()
    }

    /// Whether nothing has been run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Resolve a possibly partial lookup to a concrete partition.
    ///
    /// Without a window the largest one run is used. Without a start,
    /// `runthrough` is preferred when present, otherwise the smallest start.
    pub fn resolve(
        &self,
        strategy: &str,
        window_size: Option<usize>,
        start_index: Option<StartIndex>,
    ) -> Result<Partition> {
        let not_found = |window: Option<usize>| EngineError::NotFound {
            strategy: strategy.to_string(),
            partition: format!(
                "{}@{}",
                window.map_or_else(|| "*".to_string(), |w| w.to_string()),
                start_index.map_or_else(|| "*".to_string(), |s| s.to_string())
            ),
        };

        let windows = self.entries.get(strategy).ok_or_else(|| not_found(window_size))?;

        let (window, starts) = match window_size {
            Some(window) => windows
                .get_key_value(&window)
                .ok_or_else(|| not_found(Some(window)))?,
            None => windows.last_key_value().ok_or_else(|| not_found(None))?,
        };

        let start = match start_index {
            Some(start) if starts.contains(&start) => start,
            Some(_) => return Err(not_found(Some(*window))),
            None if starts.contains(&StartIndex::Runthrough) => StartIndex::Runthrough,
            None => *starts.first().ok_or_else(|| not_found(Some(*window)))?,
        };

        Ok(Partition::new(*window, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn register() -> RunRegister {
        let mut register = RunRegister::new();
        let mut plan = WindowPlan::new();
        plan.insert(3, vec![4, 1]);
        plan.insert(5, vec![2, 0]);
        register.insert_plan("alpha", &plan);
        register.insert("beta", Partition::new(2, StartIndex::At(6)));
        register.insert("beta", Partition::new(8, StartIndex::Runthrough));
        register.insert("beta", Partition::new(8, StartIndex::At(0)));
        register
    }

    #[test]
    fn test_counts() {
        let register = register();
        assert_eq!(register.count("alpha"), 4);
        assert_eq!(register.count("beta"), 3);
        assert_eq!(register.count("gamma"), 0);
        assert_eq!(register.len(), 7);
        assert_eq!(register.iter().count(), 7);
        assert_eq!(register.windows("alpha").collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut register = register();
        assert!(!register.insert("alpha", Partition::new(3, StartIndex::At(1))));
        assert!(register.insert("alpha", Partition::new(3, StartIndex::At(2))));
    }

    #[test]
    fn test_resolve_defaults() {
        let register = register();
        let Ok(alpha) = register.resolve("alpha", None, None) else {
            panic!("alpha should resolve");
        };
        assert_eq!(alpha, Partition::new(5, StartIndex::At(0)));

        let Ok(beta) = register.resolve("beta", None, None) else {
            panic!("beta should resolve");
        };
        assert_eq!(beta, Partition::new(8, StartIndex::Runthrough));

        let Ok(window_only) = register.resolve("alpha", Some(3), None) else {
            panic!("window-only lookup should resolve");
        };
        assert_eq!(window_only, Partition::new(3, StartIndex::At(1)));
    }

    #[test]
    fn test_resolve_missing() {
        let register = register();
        for result in [
            register.resolve("gamma", None, None),
            register.resolve("alpha", Some(4), None),
            register.resolve("alpha", Some(3), Some(StartIndex::At(2))),
        ] {
            let Err(err) = result else {
                panic!("lookup should fail");
            };
            assert_eq!(err.code(), ErrorCode::NotFound);
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let register = register();
        let Ok(json) = serde_json::to_string(&register) else {
            panic!("serialize failed");
        };
        let Ok(back) = serde_json::from_str::<RunRegister>(&json) else {
            panic!("deserialize failed");
        };
        assert_eq!(back, register);
    }
}
