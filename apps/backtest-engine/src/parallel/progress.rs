//! Per-strategy progress of one batch.
//!
//! Every item in a batch belongs to one strategy. The tracker counts finished
//! items per strategy so a batch can report when a strategy's last run or
//! last analysis lands, not just a global percentage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Counts finished items per strategy, shared by the workers of one batch.
#[derive(Debug)]
pub struct ProgressTracker {
    strategies: Vec<String>,
    planned: Vec<usize>,
    finished: Vec<AtomicUsize>,
    slot_of_item: Vec<usize>,
    completed: AtomicUsize,
    started: Instant,
}

impl ProgressTracker {
    /// Create a tracker; `owners[i]` is the strategy item `i` belongs to.
    #[must_use]
    pub fn new(owners: Vec<String>) -> Self {
        let mut slots: BTreeMap<String, usize> = BTreeMap::new();
        let mut strategies = Vec::new();
        let mut planned: Vec<usize> = Vec::new();
        let mut slot_of_item = Vec::with_capacity(owners.len());

        for owner in owners {
            let slot = *slots.entry(owner).or_insert_with_key(|name| {
                strategies.push(name.clone());
                planned.push(0);
                strategies.len() - 1
            });
            if let Some(count) = planned.get_mut(slot) {
                *count += 1;
            }
            slot_of_item.push(slot);
        }

        let finished = planned.iter().map(|_| AtomicUsize::new(0)).collect();
        Self {
            strategies,
            planned,
            finished,
            slot_of_item,
            completed: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Number of items in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.slot_of_item.len()
    }

    /// Record item `index` as finished.
    ///
    /// Returns the strategy name when this was its last planned item.
    pub fn record(&self, index: usize) -> Option<&str> {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let slot = *self.slot_of_item.get(index)?;
        let done = self.finished.get(slot)?.fetch_add(1, Ordering::Relaxed) + 1;
        if Some(&done) == self.planned.get(slot) {
            self.strategies.get(slot).map(String::as_str)
        } else {
            None
        }
    }

    /// Current counts.
    #[must_use]
    pub fn snapshot(&self) -> Progress {
        let per_strategy = self
            .strategies
            .iter()
            .zip(&self.planned)
            .zip(&self.finished)
            .map(|((name, &planned), finished)| {
                (
                    name.clone(),
                    StrategyProgress {
                        finished: finished.load(Ordering::Relaxed),
                        planned,
                    },
                )
            })
            .collect();

        Progress {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            per_strategy,
        }
    }
}

/// Finished and planned items of one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyProgress {
    /// Items finished so far.
    pub finished: usize,
    /// Items in the batch for this strategy.
    pub planned: usize,
}

impl StrategyProgress {
    /// Whether every planned item has finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.finished >= self.planned
    }
}

/// Progress snapshot of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Items finished across all strategies.
    pub completed: usize,
    /// Items in the batch.
    pub total: usize,
    /// Time since the batch started.
    pub elapsed_ms: u64,
    /// Counts keyed by strategy name.
    pub per_strategy: BTreeMap<String, StrategyProgress>,
}

impl Progress {
    /// Completion percentage; an empty batch is complete.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Strategies whose items have all finished.
    #[must_use]
    pub fn strategies_done(&self) -> usize {
        self.per_strategy.values().filter(|p| p.is_done()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_counts_per_strategy() {
        let tracker = ProgressTracker::new(owners(&["fast", "slow", "fast", "fast"]));

        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(1), Some("slow"));

        let progress = tracker.snapshot();
        assert_eq!(progress.total, 4);
        assert_eq!(progress.completed, 2);
        assert_eq!(
            progress.per_strategy.get("fast"),
            Some(&StrategyProgress {
                finished: 1,
                planned: 3
            })
        );
        assert_eq!(progress.strategies_done(), 1);
        assert!((progress.percentage() - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_last_item_reports_strategy_once() {
        let tracker = ProgressTracker::new(owners(&["hold", "hold"]));

        let reported: Vec<_> = [1, 0].iter().filter_map(|&i| tracker.record(i)).collect();
        assert_eq!(reported, vec!["hold"]);
        assert!(tracker.snapshot().per_strategy.values().all(StrategyProgress::is_done));
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let progress = ProgressTracker::new(Vec::new()).snapshot();
        assert!((progress.percentage() - 100.0).abs() < f64::EPSILON);
        assert!(progress.per_strategy.is_empty());
    }
}
