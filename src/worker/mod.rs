//! Worker contract and execution statistics.

pub mod stats;
pub mod worker;

pub use stats::{StatsSnapshot, WorkerStats};
pub use worker::{ResearchWorker, WorkerHarness};
