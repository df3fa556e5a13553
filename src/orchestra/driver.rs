use crate::orchestra::error::{Result, ScanError};
use crate::orchestra::scanner::{Interval, Scanner, TrialResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::thread;

/// Number of logical CPUs, or 1 when the platform cannot tell.
pub fn hardware_parallelism() -> usize {
    match thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            warn!("could not query available parallelism ({e}), assuming 1");
            1
        }
    }
}

/// Worker counts `1..=max`, visited in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSweep {
    max: usize,
}

impl WorkerSweep {
    /// # Errors
    /// `InvalidInput` when `max` is zero.
    pub fn new(max: usize) -> Result<Self> {
        if max == 0 {
            return Err(ScanError::invalid_input("max_workers must be at least 1"));
        }
        Ok(Self { max })
    }

    /// Sweep up to [`hardware_parallelism`].
    pub fn hardware() -> Self {
        Self {
            max: hardware_parallelism(),
        }
    }

    /// Highest worker count, and the number of trials in the sweep.
    pub fn max(&self) -> usize {
        self.max
    }

    /// # Returns
    /// The worker counts `1..=max`, smallest first.
    pub fn iter(&self) -> RangeInclusive<usize> {
        1..=self.max
    }
}

/// What to do when a trial fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run and propagate the error.
    #[default]
    FailFast,
    /// Record the failure and move on to the next worker count.
    SkipAndContinue,
}

/// A trial skipped under [`FailurePolicy::SkipAndContinue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialFailure {
    /// Worker count of the failed trial.
    pub worker_count: usize,
    /// Rendered [`ScanError`] that ended the trial.
    pub error: String,
}

/// Trials of a completed sweep, in ascending worker count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRun {
    interval: Interval,
    trials: Vec<TrialResult>,
    failures: Vec<TrialFailure>,
}

impl BenchmarkRun {
    fn empty(interval: Interval) -> Self {
        Self {
            interval,
            trials: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn with_trial(mut self, trial: TrialResult) -> Self {
        self.trials.push(trial);
        self
    }

    fn with_failure(mut self, failure: TrialFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Successful trials, ascending by worker count.
    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    /// Trials recorded under [`FailurePolicy::SkipAndContinue`], in sweep order.
    pub fn failures(&self) -> &[TrialFailure] {
        &self.failures
    }

    /// Trial with a single worker, the baseline for speedup figures.
    pub fn baseline(&self) -> Option<&TrialResult> {
        self.trials.iter().find(|t| t.worker_count() == 1)
    }
}

/// Runs one trial per worker count of the sweep, strictly one after another.
pub struct Benchmark {
    interval: Interval,
    scanner: Scanner,
    sweep: WorkerSweep,
    on_failure: FailurePolicy,
}

impl Benchmark {
    /// Creates a benchmark that fails fast.
    ///
    /// # Parameters
    /// - `interval`: Integers tested by every trial.
    /// - `scanner`: Aggregation policy and timeout shared by all trials.
    /// - `sweep`: Worker counts to run, one trial each.
    pub fn new(interval: Interval, scanner: Scanner, sweep: WorkerSweep) -> Self {
        Self {
            interval,
            scanner,
            sweep,
            on_failure: FailurePolicy::default(),
        }
    }

    /// # Parameters
    /// - `on_failure`: Whether a failed trial aborts the sweep or is recorded and skipped.
    pub fn with_failure_policy(mut self, on_failure: FailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn sweep(&self) -> WorkerSweep {
        self.sweep
    }

    /// Runs the whole sweep without observing individual trials.
    pub fn run(&self) -> Result<BenchmarkRun> {
        self.run_observed(|_| {})
    }

    /// Like [`Benchmark::run`], calling `on_trial` after every successful trial.
    ///
    /// # Errors
    /// Under [`FailurePolicy::FailFast`] the first trial error is returned and
    /// the trials recorded so far are discarded.
    pub fn run_observed<F>(&self, mut on_trial: F) -> Result<BenchmarkRun>
    where
        F: FnMut(&TrialResult),
    {
        info!(
            "sweeping 1..={} worker(s) over [{}, {})",
            self.sweep.max(),
            self.interval.start(),
            self.interval.end()
        );

        self.sweep
            .iter()
            .try_fold(BenchmarkRun::empty(self.interval), |run, worker_count| {
                match self.scanner.scan(&self.interval, worker_count) {
                    Ok(trial) => {
                        on_trial(&trial);
                        Ok(run.with_trial(trial))
                    }
                    Err(e) if self.on_failure == FailurePolicy::SkipAndContinue => {
                        warn!("trial with {worker_count} worker(s) failed: {e}");
                        Ok(run.with_failure(TrialFailure {
                            worker_count,
                            error: e.to_string(),
                        }))
                    }
                    Err(e) => Err(e),
                }
            })
    }
}
