//! Error types for drivesync

use thiserror::Error;

/// Main error type for drivesync operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed settings or unresolvable/duplicate source identifiers.
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// An artifact could not be produced for a source.
    #[error("Artifact production failed for '{source_id}': {reason}")]
    Production { source_id: String, reason: String },

    /// An upload to remote storage failed.
    #[error("Transfer failed: {reason}")]
    Transfer { reason: String },

    /// The ledger backing store could not be read or written.
    #[error("Ledger storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Malformed digest '{value}': {reason}")]
    InvalidDigest { value: String, reason: String },
}

impl Error {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn production(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Production {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    pub fn transfer(reason: impl Into<String>) -> Self {
        Self::Transfer {
            reason: reason.into(),
        }
    }

    pub fn storage_unavailable(reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage_unavailable(err.to_string())
    }
}

#[cfg(feature = "drive")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::transfer(err.to_string())
    }
}

/// Result type alias for drivesync operations
pub type Result<T> = std::result::Result<T, Error>;
