//! `drivesync plan`: a dry run against a snapshot of the ledger

use super::{Context, OutputFormat, EXIT_CANCELLED};
use crate::ledger::{Ledger, MemoryLedger};
use crate::reconcile::{Decision, PlanOutcome, PlannedSource};
use crate::Reconciler;
use anyhow::Context as _;
use clap::Args;
use std::process::ExitCode;
use std::sync::Arc;

/// Arguments for the plan command
#[derive(Args)]
pub struct PlanArgs {
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub async fn run(args: PlanArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;

    let snapshot = if config.ledger_path.exists() {
        let ledger = config
            .open_ledger()
            .with_context(|| format!("cannot open ledger {}", config.ledger_path.display()))?;
        MemoryLedger::with_entries(ledger.list().await?)
    } else {
        MemoryLedger::new()
    };

    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .with_context(|| format!("cannot create staging dir {}", config.staging_dir.display()))?;

    let reconciler = Reconciler::new(
        config.reconcile_settings(),
        Arc::new(config.producer()),
        Arc::new(snapshot),
        config.storage_client()?,
    );
    let planned = reconciler
        .plan_until_cancelled(&config.sources, &ctx.cancel)
        .await;

    match args.format {
        OutputFormat::Table => print!("{}", render_plan(&planned)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&planned)?),
    }
    if ctx.cancel.is_cancelled() {
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_plan(planned: &[PlannedSource]) -> String {
    let mut out = format!("{:<24} {:<10} {:<16} DETAIL\n", "SOURCE", "KIND", "DECISION");
    out.push_str(&"-".repeat(72));
    out.push('\n');

    for source in planned {
        let (decision, detail) = match &source.outcome {
            PlanOutcome::Decided { digest, decision } => match decision {
                Decision::Skip => ("skip", digest.short()),
                Decision::CreateNew => ("create", digest.short()),
                Decision::UpdateExisting { remote_ref } => {
                    ("update", format!("{} -> {}", digest.short(), remote_ref))
                }
            },
            PlanOutcome::Failed { step, reason } => ("FAILED", format!("[{step}] {reason}")),
        };
        out.push_str(&format!(
            "{:<24} {:<10} {:<16} {}\n",
            source.source_id, source.kind, decision, detail
        ));
    }
    out
}
