use std::collections::BTreeSet;

use crate::{
    primality::{self, Verdict},
    Aggregation, BenchConfig, Benchmark, FailurePolicy, Interval, ScanError, Scanner, WorkerSweep,
};

fn prime_set(primes: &[u64]) -> BTreeSet<u64> {
    primes.iter().copied().collect()
}

fn reference_primes(interval: &Interval) -> BTreeSet<u64> {
    interval.range().filter_map(|x| primality::check(x).prime()).collect()
}

/// Fails any trial whose interval contains 4.
fn panics_on_four(x: u64) -> Verdict {
    if x == 4 {
        panic!("refused {x}");
    }
    primality::check(x)
}

#[test]
fn worker_count_never_changes_the_primes() {
    let interval = Interval::new(10_000_000_000_000, 2_000).unwrap();
    let expected = reference_primes(&interval);
    assert!(!expected.is_empty());

    let workers = crate::orchestra::driver::hardware_parallelism().max(2);
    for aggregation in [Aggregation::Eager, Aggregation::Batched { chunk_size: 64 }] {
        let scanner = Scanner::new(aggregation).unwrap();
        let single = scanner.scan(&interval, 1).unwrap();
        let many = scanner.scan(&interval, workers).unwrap();

        assert_eq!(prime_set(single.primes_found()), expected);
        assert_eq!(prime_set(many.primes_found()), expected);
    }
}

#[test]
fn sweep_over_hardware_parallelism() {
    let sweep = WorkerSweep::hardware();
    let interval = Interval::new(10, 10).unwrap();
    let scanner = Scanner::new(Aggregation::Batched { chunk_size: 2 }).unwrap();

    let run = Benchmark::new(interval, scanner, sweep).run().unwrap();

    assert_eq!(run.trials().len(), sweep.max());
    for (i, trial) in run.trials().iter().enumerate() {
        assert_eq!(trial.worker_count(), i + 1);
        assert_eq!(trial.primes_found(), &[11, 13, 17, 19]);
        let secs = trial.total_duration().as_secs_f64();
        assert!(secs.is_finite() && secs >= 0.0);
    }
}

#[test]
fn fail_fast_aborts_the_sweep() {
    let interval = Interval::new(0, 10).unwrap();
    let scanner = Scanner::new(Aggregation::Eager)
        .unwrap()
        .with_probe(panics_on_four);

    let mut observed = 0;
    let result = Benchmark::new(interval, scanner, WorkerSweep::new(3).unwrap())
        .run_observed(|_| observed += 1);

    assert!(matches!(result, Err(ScanError::ResourceExhaustion { .. })));
    assert_eq!(observed, 0);
}

#[test]
fn skip_and_continue_records_every_failure() {
    let interval = Interval::new(0, 10).unwrap();
    let scanner = Scanner::new(Aggregation::Batched { chunk_size: 5 })
        .unwrap()
        .with_probe(panics_on_four);

    let run = Benchmark::new(interval, scanner, WorkerSweep::new(3).unwrap())
        .with_failure_policy(FailurePolicy::SkipAndContinue)
        .run()
        .unwrap();

    assert!(run.trials().is_empty());
    let failed: Vec<_> = run.failures().iter().map(|f| f.worker_count).collect();
    assert_eq!(failed, vec![1, 2, 3]);
    assert!(run.failures()[0].error.contains("refused 4"));
}

#[test]
fn zero_workers_runs_no_trial() {
    let interval = Interval::new(10, 10).unwrap();
    let scanner = Scanner::new(Aggregation::Eager).unwrap();
    assert!(matches!(
        scanner.scan(&interval, 0),
        Err(ScanError::InvalidInput(_))
    ));
}

#[test]
fn config_to_report_end_to_end() {
    let config = BenchConfig::from_json(
        r#"{ "start": 0, "length": 3, "max_workers": 2, "aggregation": "eager" }"#,
    )
    .unwrap();

    let run = config.benchmark(8).unwrap().run().unwrap();
    assert_eq!(run.trials().len(), 2);
    for trial in run.trials() {
        assert_eq!(trial.primes_found(), &[2]);
        assert!(trial.collection_duration().is_some());
    }

    let chart = crate::report::render_chart(&run, 10);
    assert_eq!(chart.lines().count(), 2);
}
