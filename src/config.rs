use crate::orchestra::driver::{Benchmark, FailurePolicy, WorkerSweep};
use crate::orchestra::error::{Result, ScanError};
use crate::orchestra::scanner::{Aggregation, Interval, Scanner};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_START: u64 = 10_000_000_000_000;
pub const DEFAULT_LENGTH: u64 = 100_000;

/// Run parameters, read from an optional JSON file.
///
/// Every field may be omitted:
///
/// ```json
/// {
///   "start": 10000000000000,
///   "length": 100000,
///   "max_workers": 8,
///   "aggregation": { "batched": { "chunk_size": 1000 } },
///   "timeout_secs": 30.0,
///   "on_failure": "skip_and_continue",
///   "report_path": "trials.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub start: u64,
    pub length: u64,
    /// Highest worker count of the sweep. Defaults to the hardware parallelism.
    pub max_workers: Option<usize>,
    pub aggregation: Aggregation,
    pub timeout_secs: Option<f64>,
    pub on_failure: FailurePolicy,
    /// Where to write the run as JSON, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_START,
            length: DEFAULT_LENGTH,
            max_workers: None,
            aggregation: Aggregation::Eager,
            timeout_secs: None,
            on_failure: FailurePolicy::FailFast,
            report_path: None,
        }
    }
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Validates the configuration and assembles the benchmark.
    /// `hardware` is used when `max_workers` is not set.
    ///
    /// # Errors
    /// `InvalidInput` for an empty or overflowing interval, a zero worker
    /// maximum, a zero chunk size or a non-positive timeout.
    pub fn benchmark(&self, hardware: usize) -> Result<Benchmark> {
        let interval = Interval::new(self.start, self.length)?;
        let sweep = WorkerSweep::new(self.max_workers.unwrap_or(hardware))?;

        let mut scanner = Scanner::new(self.aggregation)?;
        if let Some(limit) = self.timeout()? {
            scanner = scanner.with_timeout(limit);
        }

        Ok(Benchmark::new(interval, scanner, sweep).with_failure_policy(self.on_failure))
    }

    fn timeout(&self) -> Result<Option<Duration>> {
        let Some(secs) = self.timeout_secs else {
            return Ok(None);
        };
        if !(secs > 0.0) {
            return Err(ScanError::invalid_input(format!(
                "timeout_secs must be a positive number, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map(Some).map_err(|e| {
            ScanError::invalid_input(format!("timeout_secs {secs} is out of range: {e}"))
        })
    }
}
