//! Persisted record of what has been uploaded for each logical source.
//!
//! The ledger only needs atomic single-row reads and writes: each source is reconciled
//! independently, so there are no multi-row transactions.

pub mod memory;
pub mod sqlite;
pub mod unavailable;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use unavailable::UnavailableLedger;

use crate::hasher::ContentDigest;
use crate::storage::RemoteRef;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last successfully reconciled state of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub source_id: String,
    /// Fingerprint of the content last uploaded
    pub content_hash: ContentDigest,
    /// Remote object holding that content, if any upload was ever recorded
    pub remote_ref: Option<RemoteRef>,
    pub updated_at: DateTime<Utc>,
}

/// Row-level access to the ledger backing store.
///
/// Every method fails with [`crate::Error::StorageUnavailable`] when the store cannot be
/// reached.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get(&self, source_id: &str) -> Result<Option<LedgerEntry>>;

    /// Insert or replace the entry for `source_id`. Idempotent.
    async fn upsert(
        &self,
        source_id: &str,
        content_hash: ContentDigest,
        remote_ref: &RemoteRef,
    ) -> Result<()>;

    /// All entries, ordered by source id
    async fn list(&self) -> Result<Vec<LedgerEntry>>;

    /// Drop the entry for `source_id` so the next run creates a fresh remote object.
    /// Returns whether an entry existed.
    async fn forget(&self, source_id: &str) -> Result<bool>;
}
