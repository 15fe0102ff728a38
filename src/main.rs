//! poke - concurrent script runner
//!
//! Runs a batch of Rhai scripts, each in an isolated session with its own
//! deadline, collects the events they report and prints a summary.
//!
//! ## Usage
//!
//! ```bash
//! # Run every script below a directory
//! poke run scripts/
//!
//! # Run matching files two at a time with a 10s deadline
//! poke run "checks/**/*.rhai" --threads 2 --max-script-exec-time 10s
//!
//! # Stop everything on the first reported error, print JSON
//! poke run scripts/ --bail --format json
//!
//! # List the functions available to scripts
//! poke capabilities
//! ```

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod capabilities;
mod cli;
mod config;
mod discovery;
mod executor;
mod http;
mod output;
mod results;
mod script;
mod utils;

use capabilities::CapabilityOptions;
use cli::{Args, Command, RunArgs};
use config::AppConfig;
use executor::{ParallelExecutor, ScriptRunner};
use output::{colors_enabled, ResultFormatter};
use script::Capability;
use utils::init_logger;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref(), &args.layer())?;

    init_logger(config.log_level);
    debug!("Configuration: {:?}", config);

    match args.command {
        Command::Run(run_args) => run_scripts(run_args, config).await,
        Command::Capabilities => {
            list_capabilities(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn capability_options(config: &AppConfig) -> CapabilityOptions {
    CapabilityOptions {
        log_level: config.log_level,
        colorize: colors_enabled(),
        fetch_timeout: config.fetch_timeout,
    }
}

async fn run_scripts(args: RunArgs, config: AppConfig) -> Result<ExitCode> {
    let files = discovery::discover(&args.paths)?;
    info!("Discovered {} scripts", files.len());

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone());

    let runner = ScriptRunner::new(capabilities::standard(&capability_options(&config)))
        .with_deadline(config.max_script_exec_time)
        .with_bail(config.bail);
    let executor = ParallelExecutor::new(runner, config.threads);
    debug!(
        "Running with {} workers, deadline {:?}",
        executor.max_concurrent(),
        executor.runner().deadline()
    );

    let stats = executor.run(files, cancel).await?;

    let output = ResultFormatter::new(config.format).format_stats(&stats.snapshot())?;
    println!("{}", output.trim_end());

    if stats.has_errors() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn list_capabilities(config: &AppConfig) {
    println!("{:<10} {}", "session", script::SESSION_EXPORTS.join(", "));
    println!("{:<10} {}", "harness", script::HARNESS_EXPORTS.join(", "));

    for capability in capabilities::standard(&capability_options(config)).iter() {
        println!("{:<10} {}", capability.name(), capability.exports().join(", "));
    }
}

/// Cancel the run once on SIGINT or SIGTERM; running scripts wind down
fn setup_signal_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Interrupt received, cancelling scripts");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(error) => {
            warn!("Failed to set up SIGTERM handler: {}", error);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Failed to set up Ctrl-C handler: {}", error);
        std::future::pending::<()>().await;
    }
}
