//! Error handling for the backtest engine.
//!
//! Every fallible engine operation returns [`EngineError`]. Each variant maps
//! to a stable [`ErrorCode`] so callers can branch on the failure class
//! without matching on message text.
//!
//! | Code | Raised by |
//! |------|-----------|
//! | `VALIDATION` | bad partition bounds, frame shapes, concurrency settings |
//! | `NOT_FOUND` | result lookup for a partition that was never run |
//! | `DUPLICATE_NAME` | colliding or substring-overlapping strategy names |
//! | `RESOURCE` | I/O failure on the result store backing directory |
//! | `SERIALIZATION` | corrupt result blob, metadata or snapshot |
//! | `DUPLICATE_RESULT` | a second write to an already stored partition |
//! | `STRATEGY_FAILED` | a strategy returned an error inside a job |
//! | `METRIC_FAILED` | a metric function returned an error during analysis |
//! | `INVALID_STATE` | lifecycle misuse, e.g. `analyze()` before `run()` |
//! | `CLOSED` | any call on a closed or torn-down engine |
//! | `WORKER_POOL` | the worker thread pool could not be built |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::Partition;

/// Stable error classes for the backtest engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid input or configuration.
    Validation,
    /// Requested result does not exist.
    NotFound,
    /// Strategy names are not unique.
    DuplicateName,
    /// Backing storage I/O failure.
    Resource,
    /// Encoding or decoding failure.
    Serialization,
    /// Write-once violation in the result store.
    DuplicateResult,
    /// Strategy callback failure.
    StrategyFailed,
    /// Metric callback failure.
    MetricFailed,
    /// Operation not valid in the current lifecycle state.
    InvalidState,
    /// Engine has been closed.
    Closed,
    /// Worker pool construction failure.
    WorkerPool,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::DuplicateName => "DUPLICATE_NAME",
            Self::Resource => "RESOURCE",
            Self::Serialization => "SERIALIZATION",
            Self::DuplicateResult => "DUPLICATE_RESULT",
            Self::StrategyFailed => "STRATEGY_FAILED",
            Self::MetricFailed => "METRIC_FAILED",
            Self::InvalidState => "INVALID_STATE",
            Self::Closed => "CLOSED",
            Self::WorkerPool => "WORKER_POOL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Errors from backtest engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed validation before any job was dispatched.
    #[error("Validation failed: {message}")]
    Validation {
        /// Error message.
        message: String,
    },

    /// No cached result exists for the requested key.
    #[error("No result for strategy '{strategy}' at {partition}")]
    NotFound {
        /// Strategy name.
        strategy: String,
        /// Requested partition, rendered as text (may be partially resolved).
        partition: String,
    },

    /// Strategy names collide or overlap.
    #[error("Duplicate strategy name: {message}")]
    DuplicateName {
        /// Error message.
        message: String,
    },

    /// I/O failure on the result store.
    #[error("Storage error at '{}': {source}", path.display())]
    Resource {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON encoding/decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A result was already stored under this key during the current run.
    #[error("Result for strategy '{strategy}' at {partition} already stored")]
    DuplicateResult {
        /// Strategy name.
        strategy: String,
        /// Partition of the colliding write.
        partition: Partition,
    },

    /// A strategy returned an error while running a partition.
    #[error("Strategy '{strategy}' failed at {partition}: {source}")]
    Strategy {
        /// Strategy name.
        strategy: String,
        /// Partition the strategy was running.
        partition: Partition,
        /// Error returned by the strategy.
        source: anyhow::Error,
    },

    /// A metric function returned an error.
    #[error("Metric '{metric}' failed for strategy '{strategy}' at {partition}: {source}")]
    Metric {
        /// Metric name.
        metric: String,
        /// Strategy name.
        strategy: String,
        /// Partition being analyzed.
        partition: Partition,
        /// Error returned by the metric.
        source: anyhow::Error,
    },

    /// Operation is not valid in the current lifecycle state.
    #[error("Invalid engine state: {message}")]
    InvalidState {
        /// Error message.
        message: String,
    },

    /// Engine has been closed or torn down after a failure.
    #[error("Engine '{engine}' is closed")]
    Closed {
        /// Engine name.
        engine: String,
    },

    /// Worker thread pool could not be initialized.
    #[error("Failed to initialize worker pool: {message}")]
    WorkerPool {
        /// Error message.
        message: String,
    },
}

impl EngineError {
    /// Get the stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::DuplicateName { .. } => ErrorCode::DuplicateName,
            Self::Resource { .. } => ErrorCode::Resource,
            Self::Serialization(_) => ErrorCode::Serialization,
            Self::DuplicateResult { .. } => ErrorCode::DuplicateResult,
            Self::Strategy { .. } => ErrorCode::StrategyFailed,
            Self::Metric { .. } => ErrorCode::MetricFailed,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Closed { .. } => ErrorCode::Closed,
            Self::WorkerPool { .. } => ErrorCode::WorkerPool,
        }
    }

    /// Validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Lifecycle misuse.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// I/O failure at a path.
    #[must_use]
    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::StartIndex;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::validation("bad").code(),
            ErrorCode::Validation
        );
        assert_eq!(
            EngineError::invalid_state("early").code(),
            ErrorCode::InvalidState
        );
        let err = EngineError::resource(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), ErrorCode::Resource);
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::Strategy {
            strategy: "genesis".to_string(),
            partition: Partition::new(5, StartIndex::At(3)),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(
            err.to_string(),
            "Strategy 'genesis' failed at 5@3: boom"
        );
        assert_eq!(ErrorCode::StrategyFailed.to_string(), "STRATEGY_FAILED");
    }

    #[test]
    fn test_strategy_source_is_preserved() {
        #[derive(Debug, thiserror::Error)]
        #[error("custom failure")]
        struct Custom;

        let err = EngineError::Strategy {
            strategy: "s".to_string(),
            partition: Partition::new(1, StartIndex::Runthrough),
            source: anyhow::Error::new(Custom),
        };
        let EngineError::Strategy { source, .. } = err else {
            panic!("expected strategy error");
        };
        assert!(source.downcast_ref::<Custom>().is_some());
    }
}
