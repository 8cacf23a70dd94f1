//! Command-line interface for faultline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Faultline - resilience probes and retry verification for chaos experiments.
#[derive(Parser)]
#[command(name = "faultline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "FAULTLINE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, env = "FAULTLINE_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run an experiment
    Run {
        /// Experiment configuration file
        #[arg(short, long, env = "FAULTLINE_CONFIG")]
        config: PathBuf,

        /// Write the result summary here, overriding the configuration
        #[arg(short, long)]
        result_file: Option<PathBuf>,
    },

    /// Validate an experiment configuration
    Validate {
        /// Experiment configuration file
        #[arg(short, long, env = "FAULTLINE_CONFIG")]
        config: PathBuf,
    },

    /// Execute a single probe once
    Probe {
        /// Experiment configuration file
        #[arg(short, long, env = "FAULTLINE_CONFIG")]
        config: PathBuf,

        /// Probe name
        #[arg(short, long)]
        name: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
