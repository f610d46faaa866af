//! A local directory acting as remote storage (NAS mounts, removable disks)

use super::{RemoteRef, StorageClient};
use crate::producer::Artifact;
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores objects as files below a root directory. References are paths relative to the
/// root.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference, rejecting anything that would escape the root
    fn resolve(&self, remote_ref: &RemoteRef) -> Result<PathBuf> {
        let relative = Path::new(remote_ref.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || remote_ref.as_str().is_empty() {
            return Err(Error::transfer(format!("invalid remote reference '{remote_ref}'")));
        }
        Ok(self.root.join(relative))
    }

    /// Pick a reference under `parent` that no existing object uses
    fn fresh_ref(&self, parent: &str, name: &str) -> RemoteRef {
        let join = |file: &str| {
            if parent.is_empty() {
                file.to_string()
            } else {
                format!("{}/{}", parent.trim_matches('/'), file)
            }
        };

        let candidate = join(name);
        if !self.root.join(&candidate).exists() {
            return RemoteRef::new(candidate);
        }

        // An object with this name already exists but is not ours to overwrite.
        let unique = uuid::Uuid::new_v4().simple().to_string();
        RemoteRef::new(join(&format!("{}-{}", &unique[..8], name)))
    }

    async fn store(&self, remote_ref: RemoteRef, artifact: &Artifact) -> Result<RemoteRef> {
        let target = self.resolve(&remote_ref)?;
        let source = artifact.path().to_path_buf();

        tokio::task::spawn_blocking(move || copy_atomically(&source, &target))
            .await
            .map_err(|e| Error::transfer(format!("copy task failed: {e}")))?
            .map_err(|e| Error::transfer(format!("cannot write '{remote_ref}': {e}")))?;

        debug!("Stored {} bytes as {}", artifact.size(), remote_ref);
        Ok(remote_ref)
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn create_object(&self, parent: &str, name: &str, artifact: &Artifact) -> Result<RemoteRef> {
        let remote_ref = self.fresh_ref(parent, name);
        self.store(remote_ref, artifact).await
    }

    async fn overwrite_object(&self, remote_ref: &RemoteRef, artifact: &Artifact) -> Result<RemoteRef> {
        self.store(remote_ref.clone(), artifact).await
    }
}

/// Copy into a temp file beside `target`, then rename it into place
fn copy_atomically(source: &Path, target: &Path) -> io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    let mut reader = File::open(source)?;
    io::copy(&mut reader, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}
