//! # drivesync
//!
//! Incremental, hash-gated backups of directories and database dumps to cloud storage.
//!
//! Every run walks a fixed list of logical sources. Each source is turned into a single
//! artifact, fingerprinted, and compared with the digest recorded in a local ledger; only
//! sources whose content changed are uploaded. The ledger is committed after the upload
//! succeeds, so a crash between the two costs at most one redundant upload.
//!
//! ## Features
//!
//! - **Producers**: `tar` archives for directories, `mysqldump` for databases
//! - **Fingerprinting**: BLAKE3 (default) or SHA-256 over the finished artifact
//! - **Ledger**: SQLite file mapping source id to digest and remote reference
//! - **Storage**: Google Drive (feature `drive`) or a local directory
//! - **Scheduling**: systemd service and timer generation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drivesync::{Config, Reconciler};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::load("/etc/drivesync/config.toml")?;
//! let reconciler = Reconciler::new(
//!     config.reconcile_settings(),
//!     Arc::new(config.producer()),
//!     Arc::new(config.open_ledger()?),
//!     config.storage_client()?,
//! );
//!
//! let report = reconciler.run(&config.sources).await;
//! println!("{}", report.render_table());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod hasher;
pub mod ledger;
pub mod logging;
pub mod producer;
pub mod reconcile;
pub mod report;
pub mod schedule;
pub mod source;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use hasher::{ContentDigest, HashAlgorithm};
pub use ledger::{Ledger, LedgerEntry, MemoryLedger, SqliteLedger};
pub use producer::{Artifact, ArtifactProducer, SourceProducer};
pub use reconcile::{decide, Decision, ReconcileSettings, Reconciler};
pub use report::{RunReport, SourceOutcome, SourceState, Step, UploadAction};
pub use source::{LogicalSource, SourceKind};
pub use storage::{RemoteRef, StorageClient};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
