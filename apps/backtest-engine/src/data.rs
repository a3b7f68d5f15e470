//! Input time-series frames.
//!
//! A [`TimeSeriesFrame`] maps a two-part symbol key (e.g. `("EUR", "USD")`)
//! to an ordered series of floats. All series in one frame share a common
//! length, which is checked on construction.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Two-part symbol key, e.g. a base/quote currency pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    /// Base symbol.
    pub base: String,
    /// Quote symbol.
    pub quote: String,
}

impl SymbolKey {
    /// Create a new symbol key.
    #[must_use]
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl std::fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.base, self.quote)
    }
}

/// Serialized form of one series; JSON maps cannot use struct keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeriesEntry {
    base: String,
    quote: String,
    values: Vec<f64>,
}

/// A collection of equal-length float series keyed by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<SeriesEntry>", try_from = "Vec<SeriesEntry>")]
pub struct TimeSeriesFrame {
    series: BTreeMap<SymbolKey, Vec<f64>>,
    len: usize,
}

impl TimeSeriesFrame {
    /// Build a frame, checking that it is non-empty and all series share one length.
    pub fn new(series: BTreeMap<SymbolKey, Vec<f64>>) -> Result<Self> {
        let mut lengths = series.iter().map(|(key, values)| (key, values.len()));
        let Some((first_key, len)) = lengths.next() else {
            return Err(EngineError::validation("frame must contain at least one series"));
        };

        if let Some((key, other)) = lengths.find(|(_, l)| *l != len) {
            return Err(EngineError::validation(format!(
                "series {key} has length {other}, expected {len} (length of {first_key})"
            )));
        }

        Ok(Self { series, len })
    }

    /// Build a frame from `(base, quote, values)` tuples.
    pub fn from_pairs<I, B, Q>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (B, Q, Vec<f64>)>,
        B: Into<String>,
        Q: Into<String>,
    {
        let mut series = BTreeMap::new();
        for (base, quote, values) in pairs {
            let key = SymbolKey::new(base, quote);
            if series.insert(key.clone(), values).is_some() {
                return Err(EngineError::validation(format!(
                    "series {key} supplied more than once"
                )));
            }
        }
        Self::new(series)
    }

    /// Common length of every series in the frame.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the series are empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get one series by key.
    #[must_use]
    pub fn get(&self, key: &SymbolKey) -> Option<&[f64]> {
        self.series.get(key).map(Vec::as_slice)
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &SymbolKey> {
        self.series.keys()
    }

    /// Iterate over `(key, series)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&SymbolKey, &[f64])> {
        self.series.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Copy the contiguous slice `range` of every series into a new frame.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len {
            return Err(EngineError::validation(format!(
                "slice {}..{} out of bounds for frame of length {}",
                range.start, range.end, self.len
            )));
        }

        let series = self
            .series
            .iter()
            .map(|(k, v)| (k.clone(), v[range.clone()].to_vec()))
            .collect();

        Ok(Self {
            series,
            len: range.end - range.start,
        })
    }
}

impl From<TimeSeriesFrame> for Vec<SeriesEntry> {
    fn from(frame: TimeSeriesFrame) -> Self {
        frame
            .series
            .into_iter()
            .map(|(key, values)| SeriesEntry {
                base: key.base,
                quote: key.quote,
                values,
            })
            .collect()
    }
}

impl TryFrom<Vec<SeriesEntry>> for TimeSeriesFrame {
    type Error = EngineError;

    fn try_from(entries: Vec<SeriesEntry>) -> Result<Self> {
        Self::from_pairs(entries.into_iter().map(|e| (e.base, e.quote, e.values)))
    }
}
