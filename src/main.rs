use anyhow::Context;
use log::info;
use prime_scaling::orchestra::driver::hardware_parallelism;
use prime_scaling::{report, BenchConfig};
use std::env;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Optional first argument: path to a JSON config file
    let config = match env::args().nth(1) {
        Some(path) => BenchConfig::load(&path)?,
        None => BenchConfig::default(),
    };
    info!("running with {config:?}");

    let benchmark = config
        .benchmark(hardware_parallelism())
        .context("invalid benchmark configuration")?;

    report::print_header(benchmark.interval(), benchmark.sweep().max());

    let run = benchmark
        .run_observed(report::print_trial)
        .context("benchmark aborted")?;

    report::print_summary(&run);

    if let Some(path) = &config.report_path {
        report::write_json(&run, path)?;
    }

    Ok(())
}
