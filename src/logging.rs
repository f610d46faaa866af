use crate::Result;
use clap::ValueEnum;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter directive for the crate's own target; `RUST_LOG` wins when set
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "drivesync=debug"
    } else if quiet {
        "drivesync=warn"
    } else {
        "drivesync=info"
    }
}

fn env_filter(verbose: bool, quiet: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)))
}

/// Install the global subscriber. Call once, from the binary.
pub fn init_logging(verbose: bool, quiet: bool, format: LogFormat) -> Result<()> {
    let filter = env_filter(verbose, quiet);

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
    }

    Ok(())
}

/// Like [`init_logging`], but appends plain output to `log_file`
pub fn init_file_logging(log_file: &Path, verbose: bool, quiet: bool, format: LogFormat) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let filter = env_filter(verbose, quiet);

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .json()
                .init();
        }
    }

    Ok(())
}
