//! Artifact production: turn a logical source into a single byte stream on disk.
//!
//! Artifacts are materialised as temporary files in the staging directory. The file is
//! owned by the [`Artifact`] value and deleted when it is discarded or dropped, so every exit
//! path of a reconciliation step cleans up after itself.

pub mod database;
pub mod directory;

pub use database::DatabaseProducer;
pub use directory::DirectoryProducer;

use crate::source::{LogicalSource, SourceKind};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempPath;

/// A transient backup artifact for one source during one run
#[derive(Debug)]
pub struct Artifact {
    path: TempPath,
    object_name: String,
    size: u64,
}

impl Artifact {
    /// Reserve a temporary file in `staging_dir` for the artifact of `source_id`.
    ///
    /// The returned path is removed when dropped unless it is turned into an [`Artifact`].
    pub fn reserve(staging_dir: &Path, source_id: &str, suffix: &str) -> Result<TempPath> {
        fs::create_dir_all(staging_dir)?;
        let file = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize(source_id)))
            .suffix(suffix)
            .tempfile_in(staging_dir)?;
        Ok(file.into_temp_path())
    }

    /// Take ownership of a fully written temporary file
    pub fn from_temp_path(path: TempPath, object_name: impl Into<String>) -> Result<Self> {
        let size = fs::metadata(&path)?.len();
        Ok(Self {
            path,
            object_name: object_name.into(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the remote object this artifact is stored as
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the temporary file, reporting failures instead of ignoring them
    pub fn discard(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Produces artifacts for logical sources
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    /// Materialise the artifact for `source` inside `staging_dir`.
    ///
    /// Fails with [`Error::Production`] when the source is missing, unreadable, or the
    /// external tool exits unsuccessfully.
    async fn produce(&self, source: &LogicalSource, staging_dir: &Path) -> Result<Artifact>;
}

/// Dispatches each source to the producer for its kind
#[derive(Debug, Clone)]
pub struct SourceProducer {
    directory: DirectoryProducer,
    database: Option<DatabaseProducer>,
}

impl SourceProducer {
    pub fn new(directory: DirectoryProducer, database: Option<DatabaseProducer>) -> Self {
        Self {
            directory,
            database,
        }
    }
}

#[async_trait]
impl ArtifactProducer for SourceProducer {
    async fn produce(&self, source: &LogicalSource, staging_dir: &Path) -> Result<Artifact> {
        match &source.kind {
            SourceKind::Directory { path } => {
                self.directory.archive(&source.id, path, staging_dir).await
            }
            SourceKind::Database { name } => match &self.database {
                Some(database) => database.dump(&source.id, name, staging_dir).await,
                None => Err(Error::production(
                    &source.id,
                    "no [database] settings configured",
                )),
            },
        }
    }
}

/// Keep temp file prefixes to a safe character set
fn sanitize(source_id: &str) -> String {
    source_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_removed_on_discard() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let reserved = Artifact::reserve(temp_dir.path(), "docs", ".tar")?;
        fs::write(&reserved, b"payload")?;

        let artifact = Artifact::from_temp_path(reserved, "docs.tar")?;
        let path = artifact.path().to_path_buf();
        assert_eq!(artifact.size(), 7);
        assert!(path.exists());

        artifact.discard()?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_artifact_removed_on_drop() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let reserved = Artifact::reserve(temp_dir.path(), "my db/1", ".sql")?;
        let path = reserved.to_path_buf();
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("my_db_1-")));

        drop(reserved);
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_source_without_settings_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let producer = SourceProducer::new(DirectoryProducer::default(), None);
        let source = LogicalSource::database("db1", "db1");

        let result = producer.produce(&source, temp_dir.path()).await;
        assert!(matches!(result, Err(Error::Production { .. })));
        Ok(())
    }
}
