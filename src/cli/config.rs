//! `drivesync config`

use super::Context;
use crate::source::SourceKind;
use clap::{Args, Subcommand};
use std::process::ExitCode;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Load and validate the configuration, then list the resolved sources
    Check,
    /// Print the default config file location
    Path,
}

pub async fn run(args: ConfigArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", ctx.config_path()?.display());
        }
        ConfigCommand::Check => {
            let config = ctx.load_config()?;

            println!("Configuration OK");
            println!("  Ledger:   {}", config.ledger_path.display());
            println!("  Staging:  {}", config.staging_dir.display());
            println!("  Hashing:  {}", config.hash_algorithm);
            println!(
                "  Storage:  {} ({})",
                config.storage.backend_name(),
                config.storage.parent_location()
            );
            println!("  Sources:  {}", config.sources.len());
            for source in &config.sources {
                let target = match &source.kind {
                    SourceKind::Directory { path } => path.display().to_string(),
                    SourceKind::Database { name } => name.clone(),
                };
                println!("    {:<20} {:<10} {}", source.id, source.kind.label(), target);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
