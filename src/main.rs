//! drivesync - incremental, hash-gated backups to cloud storage
//!
//! Main binary entry point for the command-line interface.

use clap::Parser;
use drivesync::cli::{Cli, Commands, Context};
use drivesync::logging::{init_file_logging, init_logging};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match &cli.log_file {
        Some(path) => init_file_logging(path, cli.verbose, cli.quiet, cli.log_format),
        None => init_logging(cli.verbose, cli.quiet, cli.log_format),
    };
    if let Err(e) = logging {
        eprintln!("error: cannot initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let ctx = Context {
        config_path: cli.config,
        cancel: CancellationToken::new(),
    };
    spawn_signal_handler(ctx.cancel.clone());

    let result = match cli.command {
        Commands::Run(args) => drivesync::cli::run::run(args, &ctx).await,
        Commands::Plan(args) => drivesync::cli::plan::run(args, &ctx).await,
        Commands::Ledger(args) => drivesync::cli::ledger::run(args, &ctx).await,
        Commands::Config(args) => drivesync::cli::config::run(args, &ctx).await,
        Commands::Schedule(args) => drivesync::cli::schedule::run(args, &ctx).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Cancel the run on Ctrl-C or SIGTERM; the source in flight still finishes
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, stopping after the current source");
        cancel.cancel();
    });
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => ctrl_c().await,
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}
