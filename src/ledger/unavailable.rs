//! Stand-in for a ledger whose backing store could not be opened

use super::{Ledger, LedgerEntry};
use crate::hasher::ContentDigest;
use crate::storage::RemoteRef;
use crate::{Error, Result};
use async_trait::async_trait;

/// Fails every operation with the error that prevented opening the real ledger, so each
/// source is reported as failed instead of the run being aborted.
#[derive(Debug, Clone)]
pub struct UnavailableLedger {
    reason: String,
}

impl UnavailableLedger {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn error(&self) -> Error {
        Error::storage_unavailable(self.reason.clone())
    }
}

#[async_trait]
impl Ledger for UnavailableLedger {
    async fn get(&self, _source_id: &str) -> Result<Option<LedgerEntry>> {
        Err(self.error())
    }

    async fn upsert(
        &self,
        _source_id: &str,
        _content_hash: ContentDigest,
        _remote_ref: &RemoteRef,
    ) -> Result<()> {
        Err(self.error())
    }

    async fn list(&self) -> Result<Vec<LedgerEntry>> {
        Err(self.error())
    }

    async fn forget(&self, _source_id: &str) -> Result<bool> {
        Err(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_operation_reports_the_open_error() {
        let ledger = UnavailableLedger::new("cannot open /proc/x/ledger.db");

        match ledger.get("A").await {
            Err(Error::StorageUnavailable { reason }) => {
                assert_eq!(reason, "cannot open /proc/x/ledger.db")
            }
            other => panic!("expected StorageUnavailable, got {other:?}"),
        }
        assert!(ledger.list().await.is_err());
        assert!(ledger.forget("A").await.is_err());
    }
}
