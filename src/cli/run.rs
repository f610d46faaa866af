//! `drivesync run`

use super::{Context, OutputFormat, EXIT_CANCELLED, EXIT_SOURCE_FAILED};
use crate::Reconciler;
use anyhow::Context as _;
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Also write the run report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Exit with status 2 if any source failed
    #[arg(long)]
    pub strict: bool,

    /// How to print the run report
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub async fn run(args: RunArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;

    let ledger = config.open_run_ledger();
    let storage = config.storage_client()?;

    info!(
        "Using {} storage, ledger {}",
        config.storage.backend_name(),
        config.ledger_path.display()
    );

    let reconciler = Reconciler::new(
        config.reconcile_settings(),
        Arc::new(config.producer()),
        ledger,
        storage,
    );
    let report = reconciler
        .run_until_cancelled(&config.sources, &ctx.cancel)
        .await;

    match args.format {
        OutputFormat::Table => print!("{}", report.render_table()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .await
            .with_context(|| format!("cannot write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if report.cancelled {
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }
    if args.strict && report.has_failures() {
        return Ok(ExitCode::from(EXIT_SOURCE_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}
