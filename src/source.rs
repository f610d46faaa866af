//! Logical backup sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a logical source points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// A directory archived as a whole
    Directory { path: PathBuf },
    /// A database dumped through the configured dump tool
    Database { name: String },
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Directory { .. } => "directory",
            SourceKind::Database { .. } => "database",
        }
    }
}

/// One configured thing to back up, identified by a stable key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSource {
    pub id: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl LogicalSource {
    pub fn directory(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Directory { path: path.into() },
        }
    }

    pub fn database(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Database { name: name.into() },
        }
    }
}

impl fmt::Display for LogicalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::Directory { path } => write!(f, "{} (directory {})", self.id, path.display()),
            SourceKind::Database { name } => write!(f, "{} (database {})", self.id, name),
        }
    }
}
