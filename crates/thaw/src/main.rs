//! Thaw CLI: converts the newest snapshot of every configured job.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use thaw::{CliArgs, Config, init_tracing, run_all, shutdown_signal};
use thaw_core::signal::run_until;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let paths = args.config_paths();
    if paths.is_empty() {
        eprintln!("Error: no config files or directories specified");
        return ExitCode::FAILURE;
    }

    info!("Loading config from {} source(s)", paths.len());

    let mut config = match Config::from_paths(&paths) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(job) = &args.job {
        if let Err(e) = config.select(job) {
            eprintln!("Failed to select job: {e}");
            return ExitCode::FAILURE;
        }
    }

    info!("Starting thaw with {} job(s)", config.job_count());
    for (key, job) in config.jobs() {
        info!("  Job: {} ({} in {})", key, job.kind(), job.bucket());
    }

    let Some(result) = run_until(run_all(config), shutdown_signal()).await else {
        eprintln!("Run interrupted");
        return ExitCode::FAILURE;
    };

    match result {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            for (key, e) in &report.failed {
                eprintln!("Job {key} failed: {e}");
            }
            if report.panicked > 0 {
                eprintln!("{} job task(s) panicked", report.panicked);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
