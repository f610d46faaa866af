//! `drivesync ledger`

use super::{Context, OutputFormat};
use crate::ledger::{Ledger, LedgerEntry, SqliteLedger};
use anyhow::{bail, Context as _};
use clap::{Args, Subcommand};
use std::process::ExitCode;

#[derive(Args)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommand,
}

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// List every recorded source
    List {
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the entry for one source
    Show {
        /// Source id
        id: String,
    },
    /// Remove the entry for one source; its next run uploads a new object
    Forget {
        /// Source id
        id: String,
    },
}

pub async fn run(args: LedgerArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;
    if !config.ledger_path.exists() {
        bail!(
            "ledger {} does not exist yet; run `drivesync run` first",
            config.ledger_path.display()
        );
    }
    let ledger = SqliteLedger::open(&config.ledger_path)
        .with_context(|| format!("cannot open ledger {}", config.ledger_path.display()))?;

    match args.command {
        LedgerCommand::List { format } => {
            let entries = ledger.list().await?;
            match format {
                OutputFormat::Table => print!("{}", render_entries(&entries)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
            }
        }
        LedgerCommand::Show { id } => match ledger.get(&id).await? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => bail!("no ledger entry for source '{id}'"),
        },
        LedgerCommand::Forget { id } => {
            if !ledger.forget(&id).await? {
                bail!("no ledger entry for source '{id}'");
            }
            println!("Forgot '{id}'; the next run will create a new remote object");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn render_entries(entries: &[LedgerEntry]) -> String {
    let mut out = format!("{:<24} {:<14} {:<34} UPDATED\n", "SOURCE", "DIGEST", "REMOTE");
    for entry in entries {
        let remote = entry
            .remote_ref
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<24} {:<14} {:<34} {}\n",
            entry.source_id,
            entry.content_hash.short(),
            remote,
            entry.updated_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out
}
