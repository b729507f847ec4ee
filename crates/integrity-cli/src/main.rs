mod commands;
mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use integrity_core::config::{load_configuration, time_seed};
use integrity_core::{IntegrityConfig, SessionOptions, StopReason};
use progress::CliReporter;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info, warn};

const EXIT_ERROR: u8 = 1;
const EXIT_CORRUPT: u8 = 2;

fn main() -> ExitCode {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let args = Cli::parse();

    let outcome = match args.command {
        Some(Commands::Run {
            directory,
            seed,
            threshold,
            file_count,
            quit_on_full,
            duplicate,
        }) => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.threshold_fraction = threshold;
            }
            let options = SessionOptions {
                seed: seed.unwrap_or_else(time_seed),
                file_count_cap: file_count,
                quit_on_full,
                duplicate,
            };
            run_session(&directory, config, options)
        }
        Some(Commands::Verify { files }) => run_verify(&files, &config),
        Some(Commands::VerifyDir { directory }) => run_verify_dir(&directory, &config),
        Some(Commands::Recreate {
            directory,
            seed,
            size,
            duplicate,
        }) => run_recreate(&directory, &config, seed, size, duplicate),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(ExitCode::SUCCESS)
        }
        None => print_usage(),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!("Error: {:#}", err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// No subcommand given: show the long help and exit with an error status.
fn print_usage() -> anyhow::Result<ExitCode> {
    Cli::command()
        .print_long_help()
        .context("Unable to print help")?;
    Ok(ExitCode::from(EXIT_ERROR))
}

fn run_session(
    directory: &Path,
    config: IntegrityConfig,
    options: SessionOptions,
) -> anyhow::Result<ExitCode> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .with_context(|| format!("Unable to install handler for signal {}", signal))?;
    }

    let reporter = CliReporter::new();
    let result = integrity_core::run_fill_drain_cycle(directory, config, options, stop, &reporter)?;

    println!();
    info!(
        "Seed: {}, elapsed: {}",
        format!("{}", result.seed).cyan(),
        format!("{:.2}s", result.duration.as_secs_f64()).green(),
    );
    info!(
        "We created {} files with a total of {} bytes! ({} cull cycles, {} removed, {} remain)",
        format!("{}", result.files_created).green(),
        format!("{}", result.bytes_written).green(),
        result.cull_cycles,
        result.files_removed,
        result.live_files,
    );

    Ok(match &result.stop_reason {
        StopReason::IntegrityFailure(e) => {
            error!("{} {}", format!("[{}]", e.kind()).red(), e);
            ExitCode::from(EXIT_CORRUPT)
        }
        StopReason::NoSpace => {
            warn!("No free space above the threshold and nothing left to delete");
            ExitCode::from(EXIT_ERROR)
        }
        StopReason::Interrupted | StopReason::QuitOnFull | StopReason::FileCountReached => {
            ExitCode::SUCCESS
        }
    })
}

fn run_verify(files: &[PathBuf], config: &IntegrityConfig) -> anyhow::Result<ExitCode> {
    let outcomes = integrity_core::verify_files(files, config.verify_chunk_size);
    Ok(report_outcomes(&outcomes))
}

fn run_verify_dir(directory: &Path, config: &IntegrityConfig) -> anyhow::Result<ExitCode> {
    let outcomes = integrity_core::verify_directory(directory, config.verify_chunk_size)?;
    if outcomes.is_empty() {
        warn!("No integrity files found in {}", directory.display());
    }
    Ok(report_outcomes(&outcomes))
}

fn report_outcomes(outcomes: &[integrity_core::VerifyOutcome]) -> ExitCode {
    for outcome in outcomes {
        match &outcome.result {
            Ok(_) => println!(
                "File {} validates {}!",
                outcome.path.display(),
                "[OK]".green()
            ),
            Err(_) => println!(
                "File {} corrupt {}!",
                outcome.path.display(),
                "[ERROR]".red()
            ),
        }
    }

    if integrity_core::verifier::any_failed(outcomes) {
        ExitCode::from(EXIT_CORRUPT)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_recreate(
    directory: &Path,
    config: &IntegrityConfig,
    seed: u64,
    size: u64,
    duplicate: bool,
) -> anyhow::Result<ExitCode> {
    let created = integrity_core::recreate_file(directory, config, seed, size, duplicate)?;
    println!("File recreated as {}", created.path.display());
    Ok(ExitCode::SUCCESS)
}
