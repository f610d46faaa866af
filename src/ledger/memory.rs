//! In-process ledger

use super::{Ledger, LedgerEntry};
use crate::hasher::ContentDigest;
use crate::storage::RemoteRef;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Ledger kept in memory; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<BTreeMap<String, LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with existing entries
    pub fn with_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.source_id.clone(), entry))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn poisoned() -> Error {
        Error::storage_unavailable("in-memory ledger lock poisoned")
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get(&self, source_id: &str) -> Result<Option<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(source_id).cloned())
    }

    async fn upsert(
        &self,
        source_id: &str,
        content_hash: ContentDigest,
        remote_ref: &RemoteRef,
    ) -> Result<()> {
        let entry = LedgerEntry {
            source_id: source_id.to_string(),
            content_hash,
            remote_ref: Some(remote_ref.clone()),
            updated_at: Utc::now(),
        };
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(source_id.to_string(), entry);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.values().cloned().collect())
    }

    async fn forget(&self, source_id: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        Ok(entries.remove(source_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{hash_bytes, HashAlgorithm};

    #[tokio::test]
    async fn test_upsert_and_list_in_id_order() {
        let ledger = MemoryLedger::new();
        let digest = hash_bytes(HashAlgorithm::Blake3, b"X");

        ledger.upsert("b", digest, &RemoteRef::new("r2")).await.unwrap();
        ledger.upsert("a", digest, &RemoteRef::new("r1")).await.unwrap();

        let ids: Vec<String> = ledger
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.source_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            ledger.get("a").await.unwrap().unwrap().remote_ref,
            Some(RemoteRef::new("r1"))
        );
    }
}
