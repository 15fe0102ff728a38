//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigLayer;

/// Run scripts concurrently, each in its own isolated session
#[derive(Parser, Debug)]
#[command(name = "poke")]
#[command(version)]
#[command(about = "Run a batch of scripts concurrently with per-script deadlines")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to a configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run script files
    #[command(alias = "r")]
    Run(RunArgs),

    /// List the functions available to scripts
    Capabilities,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Script files, directories or glob patterns
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Maximum number of scripts running at once
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Run scripts one at a time
    #[arg(short, long, conflicts_with = "threads")]
    pub sync: bool,

    /// Deadline per script (e.g. 30s, 2m)
    #[arg(long, value_name = "DURATION")]
    pub max_script_exec_time: Option<String>,

    /// Output format (table, json, json-pretty, csv)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Stop every script on the first error-level event
    #[arg(long)]
    pub bail: bool,
}

impl Args {
    /// Settings given on the command line, highest precedence
    pub fn layer(&self) -> ConfigLayer {
        let log_level = match (&self.log_level, self.verbose) {
            (Some(level), _) => Some(level.clone()),
            (None, true) => Some("debug".to_string()),
            (None, false) => None,
        };

        let mut layer = ConfigLayer {
            log_level,
            ..Default::default()
        };

        if let Command::Run(run) = &self.command {
            layer.threads = if run.sync { Some(1) } else { run.threads };
            layer.max_script_exec_time = run.max_script_exec_time.clone();
            layer.format = run.format.clone();
            layer.bail = run.bail.then_some(true);
        }

        layer
    }
}
