//! Window partitioning.
//!
//! A backtest run samples contiguous sub-windows ("partitions") of the input
//! series. Each partition is identified by its window size and start index;
//! the special `runthrough` partition covers the whole history.
//!
//! # Example
//!
//! ```
//! use backtest_engine::partition::{PartitionPlanner, RunBudget};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let planner = PartitionPlanner::new(RunBudget::AllOnce).with_window_bounds(5, Some(8));
//! let plan = planner.plan(10, 0, &mut StdRng::seed_from_u64(1)).unwrap();
//! assert_eq!(plan.len(), 4);
//! ```

mod planner;
mod register;
mod types;

pub use planner::{PartitionPlanner, WindowPlan, runthrough_window};
pub use register::RunRegister;
pub use types::{LowQuotaPolicy, Partition, RunBudget, StartIndex};
