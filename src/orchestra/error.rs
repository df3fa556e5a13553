use std::{error::Error as StdError, fmt, time::Duration};

/// All errors that can abort a scan or a benchmark run.
#[derive(Debug)]
pub enum ScanError {
    /// Interval, worker count or configuration outside the valid domain.
    /// Raised before any worker is spawned.
    InvalidInput(String),
    /// The worker pool could not be built, or a worker failed while
    /// executing a unit. `worker_id` is the worker's index in its pool, when known.
    ResourceExhaustion {
        worker_id: Option<usize>,
        reason: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    /// The trial did not finish within the configured limit.
    Timeout { worker_count: usize, limit: Duration },
}

impl ScanError {
    /// Builds an `InvalidInput` error.
    ///
    /// # Parameters
    /// - `msg`: What was out of range, and why.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Wraps the reason a worker pool could not be started.
    pub(crate) fn pool_failed(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::ResourceExhaustion {
            worker_id: None,
            reason: "failed to build worker pool".into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn worker_failed(worker_id: Option<usize>, reason: impl Into<String>) -> Self {
        Self::ResourceExhaustion {
            worker_id,
            reason: reason.into(),
            source: None,
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::ResourceExhaustion {
                worker_id: Some(id),
                reason,
                ..
            } => write!(f, "resource exhaustion in worker {id}: {reason}"),
            Self::ResourceExhaustion {
                worker_id: None,
                reason,
                ..
            } => write!(f, "resource exhaustion: {reason}"),
            Self::Timeout {
                worker_count,
                limit,
            } => write!(
                f,
                "timeout: trial with {worker_count} worker(s) exceeded {:.3} s",
                limit.as_secs_f64()
            ),
        }
    }
}

impl StdError for ScanError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::ResourceExhaustion {
                source: Some(e), ..
            } => Some(&**e),
            _ => None,
        }
    }
}

/// Result type for scans and benchmark runs.
pub type Result<T> = std::result::Result<T, ScanError>;
