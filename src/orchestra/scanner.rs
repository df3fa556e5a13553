use crate::orchestra::communication::{chunked, Reply, Task};
use crate::orchestra::error::{Result, ScanError};
use crate::orchestra::worker::{self, Probe};
use crate::primality;
use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize, Serializer};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Half-open integer range `[start, start + length)` scanned by every trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    start: u64,
    length: u64,
}

impl Interval {
    /// Creates the interval `[start, start + length)`.
    ///
    /// # Parameters
    /// - `start`: First integer tested.
    /// - `length`: Number of integers tested, at least 1.
    ///
    /// # Errors
    /// `InvalidInput` when `length` is zero or the end does not fit in a `u64`.
    pub fn new(start: u64, length: u64) -> Result<Self> {
        if length == 0 {
            return Err(ScanError::invalid_input("interval length must be at least 1"));
        }
        if start.checked_add(length).is_none() {
            return Err(ScanError::invalid_input(format!(
                "interval [{start}, {start} + {length}) overflows u64"
            )));
        }
        Ok(Self { start, length })
    }

    /// First integer of the interval.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of integers in the interval.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// The interval as a std range, for iteration.
    pub fn range(&self) -> Range<u64> {
        self.start..self.end()
    }
}

/// How replies from the workers are gathered into a trial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// One task per integer, primes appended in completion order.
    #[default]
    Eager,
    /// Contiguous chunks of `chunk_size` integers, primes in interval order.
    Batched { chunk_size: usize },
}

/// Outcome of one trial at a fixed worker count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    worker_count: usize,
    primes_found: Vec<u64>,
    #[serde(serialize_with = "optional_secs")]
    collection_duration: Option<Duration>,
    #[serde(serialize_with = "secs")]
    total_duration: Duration,
}

impl TrialResult {
    /// Size of the pool the trial ran on.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Primes in the interval. Completion order under eager aggregation,
    /// ascending under batched aggregation.
    pub fn primes_found(&self) -> &[u64] {
        &self.primes_found
    }

    /// # Returns
    /// Number of primes found, independent of the worker count.
    pub fn primes_count(&self) -> usize {
        self.primes_found.len()
    }

    /// Time between the last submission and the last reply; eager aggregation only.
    pub fn collection_duration(&self) -> Option<Duration> {
        self.collection_duration
    }

    /// Wall-clock time from building the pool to joining it.
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }
}

fn secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn optional_secs<S: Serializer>(d: &Option<Duration>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Distributes an interval across a pool of workers and gathers the primes.
#[derive(Debug, Clone)]
pub struct Scanner {
    aggregation: Aggregation,
    timeout: Option<Duration>,
    probe: Probe,
}

impl Scanner {
    /// # Errors
    /// `InvalidInput` for a batched aggregation with a zero chunk size.
    pub fn new(aggregation: Aggregation) -> Result<Self> {
        if let Aggregation::Batched { chunk_size: 0 } = aggregation {
            return Err(ScanError::invalid_input("chunk_size must be at least 1"));
        }
        Ok(Self {
            aggregation,
            timeout: None,
            probe: primality::check,
        })
    }

    /// Fails any trial that runs longer than `limit` with `Timeout`.
    /// A limit too large to add to the current instant disables the check.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Replaces the primality test run by the workers.
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Per-trial limit, if one was set with [`Scanner::with_timeout`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs one trial: builds a pool of `worker_count` workers, tests every
    /// integer of `interval` and joins the workers before returning.
    ///
    /// # Parameters
    /// - `interval`: Integers to test.
    /// - `worker_count`: Size of the pool built for this trial.
    ///
    /// # Errors
    /// `InvalidInput` when `worker_count` is zero, `ResourceExhaustion` when the
    /// pool cannot be built or a worker fails, `Timeout` when the configured
    /// limit is exceeded. No partial result is returned on error.
    pub fn scan(&self, interval: &Interval, worker_count: usize) -> Result<TrialResult> {
        if worker_count == 0 {
            return Err(ScanError::invalid_input("worker_count must be at least 1"));
        }

        let start = Instant::now();
        // A limit past the range of `Instant` never expires.
        let deadline = self.timeout.and_then(|limit| start.checked_add(limit));

        let (primes_found, collection_duration) = worker::with_pool(worker_count, |pool| {
            match self.aggregation {
                Aggregation::Eager => self.collect_eager(pool, interval, deadline),
                Aggregation::Batched { chunk_size } => self
                    .collect_batched(pool, interval, chunk_size, deadline)
                    .map(|primes| (primes, None)),
            }
        })??;
        let total_duration = start.elapsed();

        info!(
            "{worker_count} worker(s): {} primes in {:.4} s",
            primes_found.len(),
            total_duration.as_secs_f64()
        );

        Ok(TrialResult {
            worker_count,
            primes_found,
            collection_duration,
            total_duration,
        })
    }

    /// One job per integer, primes appended in the order replies arrive.
    fn collect_eager(
        &self,
        pool: &ThreadPool,
        interval: &Interval,
        deadline: Option<Instant>,
    ) -> Result<(Vec<u64>, Option<Duration>)> {
        let probe = self.probe;
        let cancelled = AtomicBool::new(false);
        let (tx, rx) = channel::<Reply>();

        pool.in_place_scope(|scope| {
            let mut submitted = 0usize;
            for x in interval.range() {
                let tx = tx.clone();
                let cancelled = &cancelled;
                scope.spawn(move |_| {
                    if let Some(reply) = worker::run_task(&Task::Single(x), probe, cancelled) {
                        // the scanner stops listening only after giving up on the trial
                        let _ = tx.send(reply);
                    }
                });
                submitted += 1;
            }
            drop(tx);
            debug!(
                "submitted {submitted} task(s) to {} worker(s)",
                pool.current_num_threads()
            );

            let collect_start = Instant::now();
            let collected = (0..submitted).try_fold(Vec::new(), |mut primes, _| -> Result<Vec<u64>> {
                match self.next_reply(&rx, deadline, pool)? {
                    Reply::Single(verdict) => {
                        primes.extend(verdict);
                        Ok(primes)
                    }
                    other => Err(unexpected(other)),
                }
            });

            // Queued jobs return at once; the scope still waits for them.
            if collected.is_err() {
                cancelled.store(true, Ordering::SeqCst);
            }
            collected.map(|primes| (primes, Some(collect_start.elapsed())))
        })
    }

    /// Chunks tested by a parallel iterator on the pool, gathered in interval order.
    fn collect_batched(
        &self,
        pool: &ThreadPool,
        interval: &Interval,
        chunk_size: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<u64>> {
        let probe = self.probe;
        let chunks: Vec<Task> = chunked(interval.range(), chunk_size as u64).collect();
        debug!(
            "split interval into {} chunk(s) of up to {chunk_size} integer(s)",
            chunks.len()
        );
        let cancelled = AtomicBool::new(false);
        let (tx, rx) = channel::<Reply>();

        pool.in_place_scope(|scope| {
            let chunks = &chunks;
            let cancelled = &cancelled;
            scope.spawn(move |_| {
                let gathered: std::result::Result<Vec<Vec<u64>>, Option<Reply>> = chunks
                    .par_iter()
                    .map(|task| match worker::run_task(task, probe, cancelled) {
                        Some(Reply::Chunk { primes, .. }) => Ok(primes),
                        other => Err(other),
                    })
                    .collect();

                let reply = match gathered {
                    Ok(parts) => Some(Reply::Batch {
                        primes: parts.concat(),
                    }),
                    Err(reply) => reply,
                };
                if let Some(reply) = reply {
                    let _ = tx.send(reply);
                }
            });

            let collected = match self.next_reply(&rx, deadline, pool) {
                Ok(Reply::Batch { primes }) => Ok(primes),
                Ok(other) => Err(unexpected(other)),
                Err(e) => Err(e),
            };

            // Chunk workers stop at their next integer.
            if collected.is_err() {
                cancelled.store(true, Ordering::SeqCst);
            }
            collected
        })
    }

    fn next_reply(
        &self,
        replies: &Receiver<Reply>,
        deadline: Option<Instant>,
        pool: &ThreadPool,
    ) -> Result<Reply> {
        let received = match deadline {
            Some(deadline) => {
                replies.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => replies.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Reply::Failed { worker_id, reason }) => Err(ScanError::worker_failed(worker_id, reason)),
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(ScanError::Timeout {
                worker_count: pool.current_num_threads(),
                limit: self.timeout.unwrap_or_default(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ScanError::worker_failed(
                None,
                "all workers exited before replying",
            )),
        }
    }
}

fn unexpected(reply: Reply) -> ScanError {
    ScanError::worker_failed(None, format!("unexpected reply {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primality::Verdict;
    use std::collections::BTreeSet;
    use std::thread;

    fn as_set(trial: &TrialResult) -> BTreeSet<u64> {
        trial.primes_found().iter().copied().collect()
    }

    fn panics_on_15(x: u64) -> Verdict {
        if x == 15 {
            panic!("cannot test {x}");
        }
        primality::check(x)
    }

    fn sleepy(x: u64) -> Verdict {
        thread::sleep(Duration::from_millis(50));
        primality::check(x)
    }

    #[test]
    fn interval_rejects_empty_and_overflowing() {
        assert!(matches!(Interval::new(5, 0), Err(ScanError::InvalidInput(_))));
        assert!(matches!(
            Interval::new(u64::MAX, 1),
            Err(ScanError::InvalidInput(_))
        ));

        let interval = Interval::new(u64::MAX - 1, 1).unwrap();
        assert_eq!(interval.end(), u64::MAX);
        assert_eq!(interval.range().count(), 1);
    }

    #[test]
    fn eager_finds_primes_for_any_worker_count() {
        let interval = Interval::new(10, 10).unwrap();
        let scanner = Scanner::new(Aggregation::Eager).unwrap();
        let expected = BTreeSet::from([11, 13, 17, 19]);

        for workers in [1, 2, 4] {
            let trial = scanner.scan(&interval, workers).unwrap();
            assert_eq!(trial.worker_count(), workers);
            assert_eq!(as_set(&trial), expected);
            assert!(trial.collection_duration().is_some());
        }
    }

    #[test]
    fn batched_keeps_interval_order() {
        let interval = Interval::new(10, 10).unwrap();
        let scanner = Scanner::new(Aggregation::Batched { chunk_size: 3 }).unwrap();

        for workers in [1, 2, 4] {
            let trial = scanner.scan(&interval, workers).unwrap();
            assert_eq!(trial.primes_found(), &[11, 13, 17, 19]);
            assert_eq!(trial.collection_duration(), None);
        }
    }

    #[test]
    fn zero_and_one_are_not_prime() {
        let interval = Interval::new(0, 3).unwrap();
        for aggregation in [Aggregation::Eager, Aggregation::Batched { chunk_size: 1 }] {
            let trial = Scanner::new(aggregation).unwrap().scan(&interval, 2).unwrap();
            assert_eq!(trial.primes_found(), &[2]);
        }
    }

    #[test]
    fn zero_workers_is_invalid() {
        let interval = Interval::new(10, 10).unwrap();
        let scanner = Scanner::new(Aggregation::Eager).unwrap();
        assert!(matches!(
            scanner.scan(&interval, 0),
            Err(ScanError::InvalidInput(_))
        ));
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        assert!(matches!(
            Scanner::new(Aggregation::Batched { chunk_size: 0 }),
            Err(ScanError::InvalidInput(_))
        ));
    }

    #[test]
    fn worker_failure_abandons_trial() {
        let interval = Interval::new(10, 10).unwrap();
        for aggregation in [Aggregation::Eager, Aggregation::Batched { chunk_size: 4 }] {
            let scanner = Scanner::new(aggregation).unwrap().with_probe(panics_on_15);
            let err = scanner.scan(&interval, 2).unwrap_err();
            assert!(
                matches!(err, ScanError::ResourceExhaustion { .. }),
                "unexpected error {err}"
            );
        }
    }

    #[test]
    fn slow_trial_times_out() {
        let interval = Interval::new(0, 40).unwrap();
        let scanner = Scanner::new(Aggregation::Eager)
            .unwrap()
            .with_probe(sleepy)
            .with_timeout(Duration::from_millis(60));

        match scanner.scan(&interval, 1) {
            Err(ScanError::Timeout {
                worker_count,
                limit,
            }) => {
                assert_eq!(worker_count, 1);
                assert_eq!(limit, Duration::from_millis(60));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn batched_timeout_stops_mid_chunk() {
        // a single chunk that would take two seconds to finish
        let interval = Interval::new(0, 40).unwrap();
        let scanner = Scanner::new(Aggregation::Batched { chunk_size: 40 })
            .unwrap()
            .with_probe(sleepy)
            .with_timeout(Duration::from_millis(60));

        let started = Instant::now();
        let result = scanner.scan(&interval, 1);
        let elapsed = started.elapsed();

        assert!(
            matches!(result, Err(ScanError::Timeout { worker_count: 1, .. })),
            "expected timeout, got {result:?}"
        );
        assert!(elapsed < Duration::from_secs(1), "teardown took {elapsed:?}");
    }

    #[test]
    fn unrepresentable_timeout_never_expires() {
        let interval = Interval::new(10, 10).unwrap();
        for aggregation in [Aggregation::Eager, Aggregation::Batched { chunk_size: 4 }] {
            let trial = Scanner::new(aggregation)
                .unwrap()
                .with_timeout(Duration::MAX)
                .scan(&interval, 2)
                .unwrap();
            assert_eq!(as_set(&trial), BTreeSet::from([11, 13, 17, 19]));
        }
    }

    #[test]
    fn durations_are_finite() {
        let interval = Interval::new(1_000, 500).unwrap();
        let trial = Scanner::new(Aggregation::Eager)
            .unwrap()
            .scan(&interval, 2)
            .unwrap();
        let total = trial.total_duration().as_secs_f64();
        assert!(total.is_finite() && total >= 0.0);
        assert!(trial.collection_duration().unwrap() <= trial.total_duration());
    }

    #[test]
    fn trial_serializes_durations_as_seconds() {
        let trial = TrialResult {
            worker_count: 2,
            primes_found: vec![11, 13],
            collection_duration: None,
            total_duration: Duration::from_millis(250),
        };
        let json = serde_json::to_value(&trial).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "worker_count": 2,
                "primes_found": [11, 13],
                "collection_duration": null,
                "total_duration": 0.25,
            })
        );
    }
}
