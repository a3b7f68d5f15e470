//! Partition identifiers and run-budget settings.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineError;

const RUNTHROUGH: &str = "runthrough";
const ALL_ONCE: &str = "all_once";
const BUDGET_TYPE_ERROR: &str = "max_total_runs must be an integer, 'all_once' or null";

/// First index of a sampled window, or the full-history runthrough label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StartIndex {
    /// Window starting at this offset of the series.
    At(usize),
    /// Window covering the whole history; slices from offset 0.
    Runthrough,
}

impl StartIndex {
    /// Offset into the series where the slice begins.
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::At(start) => start,
            Self::Runthrough => 0,
        }
    }

    /// Whether this is the runthrough label.
    #[must_use]
    pub const fn is_runthrough(self) -> bool {
        matches!(self, Self::Runthrough)
    }
}

impl fmt::Display for StartIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(start) => write!(f, "{start}"),
            Self::Runthrough => f.write_str(RUNTHROUGH),
        }
    }
}

impl FromStr for StartIndex {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == RUNTHROUGH {
            return Ok(Self::Runthrough);
        }
        s.parse::<usize>().map(Self::At).map_err(|_| {
            EngineError::validation(format!(
                "start index must be a non-negative integer or '{RUNTHROUGH}', got '{s}'"
            ))
        })
    }
}

impl From<StartIndex> for String {
    fn from(start: StartIndex) -> Self {
        start.to_string()
    }
}

impl TryFrom<String> for StartIndex {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One sampled sub-window: `(window_size, start_index)`.
///
/// The strategy sees the slice `[start, start + window_size + lookback)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Partition {
    /// Number of steps the strategy trades over.
    pub window_size: usize,
    /// First index of the slice.
    pub start_index: StartIndex,
}

impl Partition {
    /// Create a partition.
    #[must_use]
    pub const fn new(window_size: usize, start_index: StartIndex) -> Self {
        Self {
            window_size,
            start_index,
        }
    }

    /// Slice bounds for a strategy with the given lookback.
    #[must_use]
    pub const fn slice_range(&self, lookback: usize) -> Range<usize> {
        let start = self.start_index.offset();
        start..start + self.window_size + lookback
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.window_size, self.start_index)
    }
}

impl FromStr for Partition {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((window, start)) = s.split_once('@') else {
            return Err(EngineError::validation(format!(
                "partition must look like '<window>@<start>', got '{s}'"
            )));
        };
        let window_size = window.parse::<usize>().map_err(|_| {
            EngineError::validation(format!("invalid window size '{window}' in '{s}'"))
        })?;
        Ok(Self::new(window_size, start.parse()?))
    }
}

impl From<Partition> for String {
    fn from(partition: Partition) -> Self {
        partition.to_string()
    }
}

impl TryFrom<String> for Partition {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Limit on the number of sampled partitions per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunBudget {
    /// Every possible start of every window size.
    #[default]
    Unconstrained,
    /// Exactly one random start per window size.
    AllOnce,
    /// Spread this many runs over all window sizes.
    Total(u64),
}

impl fmt::Display for RunBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconstrained => f.write_str("unconstrained"),
            Self::AllOnce => f.write_str(ALL_ONCE),
            Self::Total(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for RunBudget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unconstrained => serializer.serialize_none(),
            Self::AllOnce => serializer.serialize_str(ALL_ONCE),
            Self::Total(n) => serializer.serialize_u64(*n),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBudget {
    Count(u64),
    Label(String),
}

impl<'de> Deserialize<'de> for RunBudget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawBudget>::deserialize(deserializer)
            .map_err(|_| D::Error::custom(BUDGET_TYPE_ERROR))?;
        match raw {
            None => Ok(Self::Unconstrained),
            Some(RawBudget::Count(n)) => Ok(Self::Total(n)),
            Some(RawBudget::Label(label)) if label == ALL_ONCE => Ok(Self::AllOnce),
            Some(RawBudget::Label(_)) => Err(D::Error::custom(BUDGET_TYPE_ERROR)),
        }
    }
}

/// How windows are picked when the run budget is smaller than the number of window sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowQuotaPolicy {
    /// Include each window size with probability `budget / num_windows`, in
    /// ascending order, until the budget is used up.
    #[default]
    Bernoulli,
    /// Include exactly `budget` window sizes, evenly spaced over the range.
    EvenlySpaced,
}
