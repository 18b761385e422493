#![doc = include_str!("../README.md")]

mod config;
mod driver;
mod telemetry;

use clap::Parser;
use config::{CliArgs, DriverConfig};
use telemetry::init_telemetry;

// Workers allocate small vectors concurrently; mimalloc keeps that off the
// system allocator's locks.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DriverConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let report = driver::run(&config)?;

    tracing::info!(
        issued = report.issued,
        failures = report.failures,
        elapsed_ms = report.elapsed.as_millis() as u64,
        ids_per_second = report.ids_per_second() as u64,
        "run finished"
    );
    if let Some(e) = &report.last_error {
        tracing::warn!("last draw failure: {e}");
    }
    for (store, stats) in report.store_stats.iter().enumerate() {
        tracing::info!(
            store,
            reads = stats.reads,
            inserts = stats.inserts,
            cas_calls = stats.cas_calls,
            cas_successes = stats.cas_successes,
            "store statistics"
        );
    }
    for sample in &report.samples {
        tracing::info!(sample = sample.as_str(), "formatted id");
    }
    Ok(())
}

fn log_startup_info(config: &DriverConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting driver with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting driver with {} stores, {} sequences and {} threads",
            config.stores(),
            config.sequences.len(),
            config.threads
        );
    }
}
