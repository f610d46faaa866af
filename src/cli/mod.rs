//! Command-line interface for drivesync.
//!
//! Each subcommand lives in its own module exposing an `Args` struct and an async `run`.

use crate::logging::LogFormat;
use crate::Config;
use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod ledger;
pub mod plan;
pub mod run;
pub mod schedule;

/// Exit code when `run --strict` saw a failed source
pub const EXIT_SOURCE_FAILED: u8 = 2;

/// Exit code when a signal stopped the run before every source was processed
pub const EXIT_CANCELLED: u8 = 130;

/// drivesync - incremental, hash-gated backups to cloud storage
#[derive(Parser)]
#[command(name = "drivesync")]
#[command(about = "Incremental, hash-gated backups of directories and database dumps")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/drivesync/config.toml)
    #[arg(long, short = 'c', global = true, env = "DRIVESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log format: text or json
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile every configured source
    Run(run::RunArgs),
    /// Show what a run would do without uploading or touching the ledger
    Plan(plan::PlanArgs),
    /// Inspect ledger entries
    Ledger(ledger::LedgerArgs),
    /// Validate the configuration
    Config(config::ConfigArgs),
    /// Generate systemd units for periodic runs
    Schedule(schedule::ScheduleArgs),
}

/// State shared by every command handler
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config path; `None` means the default location
    pub config_path: Option<PathBuf>,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::default_path()?),
        }
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        let path = self.config_path()?;
        Config::load(&path).with_context(|| format!("invalid configuration {}", path.display()))
    }
}

/// Output format for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
