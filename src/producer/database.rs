//! Database dumps produced by an external `mysqldump`

use super::Artifact;
use crate::{Error, Result};
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Connection and tool settings for database dumps, with secrets already resolved
#[derive(Clone, PartialEq, Eq)]
pub struct DumpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: Option<String>,
    pub program: String,
    pub extra_args: Vec<String>,
}

impl std::fmt::Debug for DumpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("program", &self.program)
            .field("extra_args", &self.extra_args)
            .finish()
    }
}

impl DumpSettings {
    /// Command-line arguments for dumping `database`. The password is never part of argv.
    pub fn args(&self, database: &str) -> Vec<String> {
        let mut args = vec![
            format!("--host={}", self.host),
            format!("--user={}", self.user),
            "--skip-dump-date".to_string(),
            "--single-transaction".to_string(),
        ];
        if let Some(port) = self.port {
            args.push(format!("--port={port}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(database.to_string());
        args
    }
}

/// Dumps one database into a single artifact
#[derive(Debug, Clone)]
pub struct DatabaseProducer {
    settings: DumpSettings,
}

impl DatabaseProducer {
    pub fn new(settings: DumpSettings) -> Self {
        Self { settings }
    }

    pub async fn dump(&self, source_id: &str, database: &str, staging_dir: &Path) -> Result<Artifact> {
        let output = Artifact::reserve(staging_dir, source_id, ".sql")?;
        let stdout = File::create(&output)?;

        debug!("Dumping database {} with {}", database, self.settings.program);

        let mut command = Command::new(&self.settings.program);
        command
            .args(self.settings.args(database))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped());
        if let Some(password) = &self.settings.password {
            command.env("MYSQL_PWD", password);
        }

        // `output()` would re-pipe stdout, so spawn and only collect stderr.
        let child = command.spawn().map_err(|e| {
            Error::production(
                source_id,
                format!("failed to execute {}: {e}", self.settings.program),
            )
        })?;
        let result = child.wait_with_output().await.map_err(|e| {
            Error::production(
                source_id,
                format!("{} did not finish: {e}", self.settings.program),
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

        Artifact::from_temp_path(output, format!("{source_id}.sql"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings(program: &str) -> DumpSettings {
        DumpSettings {
            host: "localhost".to_string(),
            port: Some(3307),
            user: "backup".to_string(),
            password: Some("s3cret".to_string()),
            program: program.to_string(),
            extra_args: vec!["--routines".to_string()],
        }
    }

    #[test]
    fn test_password_stays_out_of_argv() {
        let args = settings("mysqldump").args("shop");
        assert!(args.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(args.last().map(String::as_str), Some("shop"));
        assert!(args.contains(&"--port=3307".to_string()));
        assert!(args.contains(&"--skip-dump-date".to_string()));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", settings("mysqldump"));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_production_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let producer = DatabaseProducer::new(settings("false"));

        let result = producer.dump("shop", "shop", temp_dir.path()).await;
        assert!(matches!(result, Err(Error::Production { .. })));
        assert_eq!(fs::read_dir(temp_dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_dump_output_lands_in_artifact() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let producer = DatabaseProducer::new(settings("echo"));

        let artifact = producer.dump("shop", "shop", temp_dir.path()).await?;
        let content = fs::read_to_string(artifact.path())?;

        assert_eq!(artifact.object_name(), "shop.sql");
        assert_eq!(artifact.size(), content.len() as u64);
        assert!(content.contains("--skip-dump-date"));
        assert!(content.trim_end().ends_with("shop"));

        let other = producer.dump("crm", "crm", temp_dir.path()).await?;
        assert_ne!(fs::read(other.path())?, fs::read(artifact.path())?);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_program_is_production_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let producer = DatabaseProducer::new(settings("/nonexistent/mysqldump"));

        let result = producer.dump("shop", "shop", temp_dir.path()).await;
        assert!(matches!(result, Err(Error::Production { .. })));
        Ok(())
    }
}
