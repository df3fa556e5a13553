//! Primality-scan benchmark measuring how wall-clock time scales with the
//! number of parallel workers.

pub mod config;
pub mod orchestra;
pub mod primality;
pub mod report;

#[cfg(test)]
mod tests;

pub use config::BenchConfig;
pub use orchestra::driver::{Benchmark, BenchmarkRun, FailurePolicy, WorkerSweep};
pub use orchestra::error::{Result, ScanError};
pub use orchestra::scanner::{Aggregation, Interval, Scanner, TrialResult};
pub use primality::Verdict;
