//! Parallel job execution using Rayon.
//!
//! Jobs in a batch are independent; they share nothing but what the job
//! closure captures. A batch either returns every result or the first error.

mod concurrency;
mod executor;
mod progress;

pub use concurrency::Concurrency;
pub use executor::WorkerPool;
pub use progress::{Progress, ProgressTracker, StrategyProgress};
