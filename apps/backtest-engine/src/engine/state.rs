//! Engine lifecycle state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Strategies registered, nothing run.
    Idle,
    /// Runs stored, not analyzed.
    Ran,
    /// Runs stored and analyzed.
    Analyzed,
    /// Store released; only `load()` can revive the engine.
    Closed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ran => write!(f, "ran"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Persistent part of the engine state, saved with every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    /// A `run()` completed and its results are stored.
    pub has_run: bool,
    /// `analyze()` completed for the current run.
    pub is_analyzed: bool,
    /// Currency of the current run.
    #[serde(default)]
    pub reference_currency: Option<String>,
    /// Strategy name to lookback.
    #[serde(default)]
    pub lookbacks: BTreeMap<String, usize>,
}

impl EngineState {
    /// Fresh state for the given lookbacks.
    #[must_use]
    pub const fn new(lookbacks: BTreeMap<String, usize>) -> Self {
        Self {
            has_run: false,
            is_analyzed: false,
            reference_currency: None,
            lookbacks,
        }
    }

    /// Lifecycle implied by the flags, ignoring closure.
    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        match (self.has_run, self.is_analyzed) {
            (true, true) => Lifecycle::Analyzed,
            (true, false) => Lifecycle::Ran,
            (false, _) => Lifecycle::Idle,
        }
    }

    /// Forget the current run, keeping lookbacks.
    pub fn clear_run(&mut self) {
        self.has_run = false;
        self.is_analyzed = false;
        self.reference_currency = None;
    }

    /// Record a completed run.
    pub fn mark_ran(&mut self, reference_currency: &str) {
        self.has_run = true;
        self.is_analyzed = false;
        self.reference_currency = Some(reference_currency.to_string());
    }

    /// Record a completed analysis. Requires a prior run.
    pub const fn mark_analyzed(&mut self) {
        if self.has_run {
            self.is_analyzed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut state = EngineState::new(BTreeMap::from([("hold".to_string(), 2)]));
        assert_eq!(state.lifecycle(), Lifecycle::Idle);

        state.mark_analyzed();
        assert_eq!(state.lifecycle(), Lifecycle::Idle);
        assert!(!state.is_analyzed);

        state.mark_ran("EUR");
        assert_eq!(state.lifecycle(), Lifecycle::Ran);
        state.mark_analyzed();
        assert_eq!(state.lifecycle(), Lifecycle::Analyzed);

        state.clear_run();
        assert_eq!(state.lifecycle(), Lifecycle::Idle);
        assert_eq!(state.reference_currency, None);
        assert_eq!(state.lookbacks.get("hold"), Some(&2));
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut state = EngineState::new(BTreeMap::from([("hold".to_string(), 5)]));
        state.mark_ran("USD");
        let Ok(json) = serde_json::to_string(&state) else {
            panic!("state should serialize");
        };
        let Ok(parsed) = serde_json::from_str::<EngineState>(&json) else {
            panic!("state should deserialize");
        };
        assert_eq!(parsed, state);
        assert_eq!(Lifecycle::Closed.to_string(), "closed");
    }
}
