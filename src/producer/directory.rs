//! Directory archives produced by an external `tar`

use super::Artifact;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

/// How directories are archived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSettings {
    /// Archive program, invoked with GNU tar arguments
    #[serde(default = "default_archive_program")]
    pub program: String,
    /// Gzip the archive (without an embedded timestamp)
    #[serde(default)]
    pub compress: bool,
}

fn default_archive_program() -> String {
    "tar".to_string()
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            program: default_archive_program(),
            compress: false,
        }
    }
}

impl ArchiveSettings {
    pub fn extension(&self) -> &'static str {
        if self.compress {
            ".tar.gz"
        } else {
            ".tar"
        }
    }

    /// Arguments producing a byte-identical archive for an unchanged directory
    pub fn args(&self, output: &Path, dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--sort=name".to_string(),
            "--owner=0".to_string(),
            "--group=0".to_string(),
            "--numeric-owner".to_string(),
        ];
        if self.compress {
            args.push("--use-compress-program=gzip -n".to_string());
        }
        args.push("-cf".to_string());
        args.push(output.display().to_string());
        args.push("-C".to_string());
        args.push(dir.display().to_string());
        args.push(".".to_string());
        args
    }
}

/// Archives a directory into a single artifact
#[derive(Debug, Clone, Default)]
pub struct DirectoryProducer {
    settings: ArchiveSettings,
}

impl DirectoryProducer {
    pub fn new(settings: ArchiveSettings) -> Self {
        Self { settings }
    }

    pub async fn archive(&self, source_id: &str, dir: &Path, staging_dir: &Path) -> Result<Artifact> {
        if !dir.is_dir() {
            return Err(Error::production(
                source_id,
                format!("source directory {} is missing", dir.display()),
            ));
        }

        let (files, bytes) = scan_readable(source_id, dir.to_path_buf()).await?;
        debug!("Archiving {} ({} files, {} bytes)", dir.display(), files, bytes);

        let extension = self.settings.extension();
        let output = Artifact::reserve(staging_dir, source_id, extension)?;

        let result = Command::new(&self.settings.program)
            .args(self.settings.args(&output, dir))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::production(
                    source_id,
                    format!("failed to execute {}: {e}", self.settings.program),
                )
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::production(
                source_id,
                format!(
                    "{} exited with {}: {}",
                    self.settings.program,
                    result.status,
                    stderr.trim()
                ),
            ));
        }

        Artifact::from_temp_path(output, format!("{source_id}{extension}"))
    }
}

/// Walk the directory up front so unreadable entries fail before the archiver runs
async fn scan_readable(source_id: &str, dir: PathBuf) -> Result<(u64, u64)> {
    let id = source_id.to_string();
    tokio::task::spawn_blocking(move || {
        let mut files = 0u64;
        let mut bytes = 0u64;
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                Error::production(&id, format!("source unreadable: {e}"))
            })?;
            if entry.file_type().is_file() {
                files += 1;
                bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok((files, bytes))
    })
    .await
    .map_err(|e| Error::production(source_id, format!("directory scan aborted: {e}")))?
}
