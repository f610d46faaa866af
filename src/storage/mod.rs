//! Remote storage clients.
//!
//! A storage client only needs two operations: create a new object under a parent location,
//! and overwrite an existing object by its reference. Both return the reference the content
//! now lives under.

#[cfg(feature = "drive")]
pub mod drive;
pub mod local;

#[cfg(feature = "drive")]
pub use drive::DriveStorage;
pub use local::LocalStorage;

use crate::producer::Artifact;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle identifying a stored artifact in remote storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRef(String);

impl RemoteRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uploads artifacts to remote storage
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Store `artifact` as a new object called `name` under `parent`.
    ///
    /// Fails with [`crate::Error::Transfer`].
    async fn create_object(&self, parent: &str, name: &str, artifact: &Artifact) -> Result<RemoteRef>;

    /// Replace the content of the object behind `remote_ref`.
    ///
    /// Fails with [`crate::Error::Transfer`].
    async fn overwrite_object(&self, remote_ref: &RemoteRef, artifact: &Artifact) -> Result<RemoteRef>;
}
