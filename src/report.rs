use crate::orchestra::driver::BenchmarkRun;
use crate::orchestra::scanner::{Interval, TrialResult};
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const CHART_WIDTH: usize = 40;

pub fn print_header(interval: &Interval, max_workers: usize) {
    println!(
        "Testing interval: {} to {}",
        group_thousands(interval.start()),
        group_thousands(interval.end())
    );
    println!("Maximum number of workers available: {max_workers}\n");
}

pub fn print_trial(trial: &TrialResult) {
    print!("{}", format_trial(trial));
}

pub fn print_summary(run: &BenchmarkRun) {
    println!("\nTotal time vs. number of workers");
    print!("{}", render_chart(run, CHART_WIDTH));

    for failure in run.failures() {
        println!(
            "trial with {} worker(s) failed: {}",
            failure.worker_count, failure.error
        );
    }
}

pub fn write_json(run: &BenchmarkRun, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, run)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush report to {}", path.display()))?;
    log::info!("report written to {}", path.display());
    Ok(())
}

fn format_trial(trial: &TrialResult) -> String {
    let collection = trial
        .collection_duration()
        .map(|d| format!("Collection time: {:8.4} s\n", d.as_secs_f64()))
        .unwrap_or_default();
    format!(
        "\nTesting with {} worker(s)\nPrimes found: {}\n{collection}Total time: {:8.4} s\n{}\n",
        trial.worker_count(),
        trial.primes_count(),
        trial.total_duration().as_secs_f64(),
        "-".repeat(30),
    )
}

/// One row per trial: worker count, a bar proportional to the total time,
/// the time itself and the speedup over the single-worker trial.
pub fn render_chart(run: &BenchmarkRun, width: usize) -> String {
    let longest = run
        .trials()
        .iter()
        .map(|t| t.total_duration().as_secs_f64())
        .fold(0.0_f64, f64::max);
    let baseline = run.baseline().map(|t| t.total_duration().as_secs_f64());

    run.trials()
        .iter()
        .map(|trial| {
            let secs = trial.total_duration().as_secs_f64();
            let bar = if longest > 0.0 {
                ((secs / longest) * width as f64).round() as usize
            } else {
                0
            };
            let speedup = match baseline {
                Some(base) if secs > 0.0 => format!("{:5.2}x", base / secs),
                _ => "    -".to_string(),
            };
            format!(
                "{:>3} | {:<width$} {:8.4} s {speedup}\n",
                trial.worker_count(),
                "#".repeat(bar.max(1)),
                secs,
            )
        })
        .collect()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
