//! Worker count settings.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// How many worker threads a batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Concurrency {
    /// Run every job in the calling thread (`n_jobs = 0`).
    #[default]
    Sequential,
    /// One worker per available core, capped at the job count (`n_jobs = -1`).
    AllCores,
    /// Exactly this many workers, capped at the job count.
    Fixed(NonZeroUsize),
}

impl Concurrency {
    /// Map the conventional `n_jobs` integer to a concurrency setting.
    pub fn from_n_jobs(n_jobs: i64) -> Result<Self> {
        match n_jobs {
            0 => Ok(Self::Sequential),
            -1 => Ok(Self::AllCores),
            n if n > 0 => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Self::Fixed)
                .ok_or_else(|| EngineError::validation(format!("n_jobs {n} is too large"))),
            n => Err(EngineError::validation(format!(
                "n_jobs must be 0 (sequential), -1 (all cores) or positive, got {n}"
            ))),
        }
    }

    /// The `n_jobs` integer for this setting.
    #[must_use]
    pub fn n_jobs(self) -> i64 {
        match self {
            Self::Sequential => 0,
            Self::AllCores => -1,
            Self::Fixed(n) => i64::try_from(n.get()).unwrap_or(i64::MAX),
        }
    }

    /// Worker threads to use for `job_count` jobs; `None` means run inline.
    #[must_use]
    pub fn threads_for(self, job_count: usize) -> Option<usize> {
        let wanted = match self {
            Self::Sequential => return None,
            Self::AllCores => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            Self::Fixed(n) => n.get(),
        };
        Some(wanted.min(job_count).max(1))
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::AllCores => f.write_str("all cores"),
            Self::Fixed(n) => write!(f, "{n} workers"),
        }
    }
}

impl TryFrom<i64> for Concurrency {
    type Error = EngineError;

    fn try_from(n_jobs: i64) -> Result<Self> {
        Self::from_n_jobs(n_jobs)
    }
}

impl From<Concurrency> for i64 {
    fn from(concurrency: Concurrency) -> Self {
        concurrency.n_jobs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, Some(Concurrency::Sequential) ; "sequential")]
    #[test_case(-1, Some(Concurrency::AllCores) ; "all cores")]
    #[test_case(4, NonZeroUsize::new(4).map(Concurrency::Fixed) ; "fixed")]
    #[test_case(-2, None ; "other negative")]
    #[test_case(-8, None ; "large negative")]
    fn test_from_n_jobs(n_jobs: i64, expected: Option<Concurrency>) {
        assert_eq!(Concurrency::from_n_jobs(n_jobs).ok(), expected);
    }

    #[test]
    fn test_threads_capped_by_jobs() {
        assert_eq!(Concurrency::Sequential.threads_for(10), None);
        let Ok(fixed) = Concurrency::from_n_jobs(8) else {
            panic!("8 workers should be valid");
        };
        assert_eq!(fixed.threads_for(3), Some(3));
        assert_eq!(fixed.threads_for(0), Some(1));
        assert!(Concurrency::AllCores.threads_for(2).is_some_and(|n| n <= 2));
    }

    #[test]
    fn test_n_jobs_round_trip() {
        for n in [0, -1, 6] {
            let Ok(concurrency) = Concurrency::from_n_jobs(n) else {
                panic!("{n} should be valid");
            };
            assert_eq!(concurrency.n_jobs(), n);
        }
    }
}
