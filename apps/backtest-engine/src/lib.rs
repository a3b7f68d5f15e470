// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Backtest Engine - Rust Core Library
//!
//! Window-sampling statistical backtester. Contiguous sub-windows of a
//! historical series are sampled at random, a pluggable strategy is run over
//! every window on a worker pool, each run is cached, and the cached runs are
//! reduced into risk/performance metrics.
//!
//! # Pipeline
//!
//! - **partition**: `PartitionPlanner` samples start indices per window size
//!   under min/max window and run-budget constraints; `RunRegister` indexes
//!   what was planned
//! - **dispatch**: `JobDispatcher` slices the input frames, runs a fresh
//!   strategy clone per partition, and writes each result once
//! - **store**: `ResultStore` is the per-engine directory cache of run
//!   results and metadata
//! - **metrics**: `MetricsAnalyzer` reduces every stored run through the
//!   standard and custom metric sets
//! - **engine**: `Engine` owns the lifecycle (run, analyze, reset, close,
//!   save/load) and tears the store down on any failure
//!
//! # Example
//!
//! ```no_run
//! use backtest_engine::{BuyAndHold, Engine, EngineConfig, RunConfig, Strategy, TimeSeriesFrame};
//!
//! # fn main() -> Result<(), backtest_engine::EngineError> {
//! let price = TimeSeriesFrame::from_pairs([("BTC", "EUR", vec![1.0, 1.1, 1.3, 1.2, 1.4])])?;
//! let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(BuyAndHold::new("hold", 1, 100.0))];
//!
//! let mut engine = Engine::new(EngineConfig::default(), strategies)?;
//! engine.run(&price, None, &RunConfig::new("EUR"))?;
//! let results = engine.analyze(None)?;
//! println!("{:?}", results.standard_mean("hold", "sharpe_ratio"));
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Modules
// =============================================================================

/// YAML configuration with environment interpolation.
pub mod config;

/// Named multi-series input frames.
pub mod data;

/// Job execution against strategies and the result store.
pub mod dispatch;

/// Engine lifecycle and snapshots.
pub mod engine;

/// Error types and stable error codes.
pub mod error;

/// Standard and custom metric reduction.
pub mod metrics;

/// Tracing subscriber setup.
pub mod observability;

/// Worker pool, concurrency settings, progress tracking.
pub mod parallel;

/// Window partition planning and the run register.
pub mod partition;

/// Directory-backed result cache.
pub mod store;

/// Strategy interface and a reference strategy.
pub mod strategy;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    Config, ConfigError, EngineConfig, LogFormat, LoggingConfig, RunConfig, load_config,
};
pub use data::{SymbolKey, TimeSeriesFrame};
pub use dispatch::{RunBalanceSummary, RunBalances};
pub use engine::{Engine, EngineState, Lifecycle};
pub use error::{EngineError, ErrorCode, Result};
pub use metrics::{AnalysisResults, MetricResult, MetricSet};
pub use partition::{LowQuotaPolicy, Partition, RunBudget, StartIndex};
pub use store::ResultKey;
pub use strategy::{BuyAndHold, RunResult, Strategy};
