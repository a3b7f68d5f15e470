//! Result keys and their on-disk names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::partition::{Partition, StartIndex};

/// File suffix of a stored run.
pub const RUN_FILE_SUFFIX: &str = ".run.json";

/// Identifies one stored run: `(strategy, window_size, start_index)`.
///
/// The text form is `{strategy}_{window}_{start}`; it is parsed from the
/// right, so strategy names may contain underscores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResultKey {
    /// Strategy name.
    pub strategy: String,
    /// Partition the strategy ran over.
    pub partition: Partition,
}

impl ResultKey {
    /// Create a key.
    #[must_use]
    pub fn new(strategy: impl Into<String>, partition: Partition) -> Self {
        Self {
            strategy: strategy.into(),
            partition,
        }
    }

    /// File name of the run blob.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{self}{RUN_FILE_SUFFIX}")
    }

    /// Parse a run blob file name; `None` for foreign files.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(RUN_FILE_SUFFIX)?.parse().ok()
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.strategy, self.partition.window_size, self.partition.start_index
        )
    }
}

impl FromStr for ResultKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || EngineError::validation(format!("malformed result key '{s}'"));

        let mut parts = s.rsplitn(3, '_');
        let start = parts.next().ok_or_else(malformed)?;
        let window = parts.next().ok_or_else(malformed)?;
        let strategy = parts.next().filter(|name| !name.is_empty()).ok_or_else(malformed)?;

        let window_size = window.parse::<usize>().map_err(|_| malformed())?;
        let start_index = start.parse::<StartIndex>().map_err(|_| malformed())?;

        Ok(Self::new(strategy, Partition::new(window_size, start_index)))
    }
}

impl From<ResultKey> for String {
    fn from(key: ResultKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ResultKey {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("genesis", 5, StartIndex::At(3), "genesis_5_3" ; "plain")]
    #[test_case("moving_avg_cross", 12, StartIndex::At(0), "moving_avg_cross_12_0" ; "underscored name")]
    #[test_case("hold", 250, StartIndex::Runthrough, "hold_250_runthrough" ; "runthrough")]
    fn test_text_form(strategy: &str, window: usize, start: StartIndex, text: &str) {
        let key = ResultKey::new(strategy, Partition::new(window, start));
        assert_eq!(key.to_string(), text);
        let Ok(parsed) = text.parse::<ResultKey>() else {
            panic!("'{text}' should parse");
        };
        assert_eq!(parsed, key);
    }

    #[test_case("_5_3" ; "empty strategy")]
    #[test_case("hold_x_3" ; "bad window")]
    #[test_case("hold_5_y" ; "bad start")]
    #[test_case("hold" ; "too few parts")]
    fn test_malformed(text: &str) {
        assert!(text.parse::<ResultKey>().is_err());
    }

    #[test]
    fn test_file_name() {
        let key = ResultKey::new("hold", Partition::new(4, StartIndex::At(9)));
        assert_eq!(key.file_name(), "hold_4_9.run.json");
        assert_eq!(ResultKey::from_file_name("hold_4_9.run.json"), Some(key));
        assert_eq!(ResultKey::from_file_name("notes.txt"), None);
    }
}
