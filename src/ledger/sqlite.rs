//! SQLite-backed ledger

use super::{Ledger, LedgerEntry};
use crate::hasher::ContentDigest;
use crate::storage::RemoteRef;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS ledger (
    source_id    TEXT PRIMARY KEY NOT NULL,
    content_hash TEXT NOT NULL,
    remote_ref   TEXT,
    updated_at   TEXT NOT NULL
)";

/// Ledger stored in a single SQLite table
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLedger {
    /// Open (creating if needed) the ledger database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::storage_unavailable(format!(
                        "cannot create ledger directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        debug!("Opened ledger at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run `op` against the connection on the blocking pool. The mutex is held only for the
    /// duration of that single statement.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::storage_unavailable("ledger connection poisoned"))?;
            op(&guard)
        })
        .await
        .map_err(|e| Error::storage_unavailable(format!("ledger task failed: {e}")))?
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn get(&self, source_id: &str) -> Result<Option<LedgerEntry>> {
        let source_id = source_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, content_hash, remote_ref, updated_at \
                 FROM ledger WHERE source_id = ?",
            )?;
            let mut rows = stmt.query([&source_id])?;
            if let Some(row) = rows.next()? {
                return Ok(Some(entry_from_row(row)?));
            }
            Ok(None)
        })
        .await
    }

    async fn upsert(
        &self,
        source_id: &str,
        content_hash: ContentDigest,
        remote_ref: &RemoteRef,
    ) -> Result<()> {
        let source_id = source_id.to_string();
        let remote_ref = remote_ref.as_str().to_string();
        let updated_at = Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO ledger (source_id, content_hash, remote_ref, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(source_id) DO UPDATE SET
                    content_hash=excluded.content_hash,
                    remote_ref=excluded.remote_ref,
                    updated_at=excluded.updated_at",
                params![source_id, content_hash.to_hex(), remote_ref, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<LedgerEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, content_hash, remote_ref, updated_at \
                 FROM ledger ORDER BY source_id",
            )?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(entry_from_row(row)?);
            }
            Ok(entries)
        })
        .await
    }

    async fn forget(&self, source_id: &str) -> Result<bool> {
        let source_id = source_id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM ledger WHERE source_id = ?", [&source_id])?;
            Ok(removed > 0)
        })
        .await
    }
}

fn entry_from_row(row: &Row<'_>) -> Result<LedgerEntry> {
    let source_id: String = row.get(0)?;
    let content_hash: String = row.get(1)?;
    let remote_ref: Option<String> = row.get(2)?;
    let updated_at: String = row.get(3)?;

    let content_hash = content_hash.parse::<ContentDigest>().map_err(|e| {
        Error::storage_unavailable(format!("corrupt ledger row for '{source_id}': {e}"))
    })?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| {
            Error::storage_unavailable(format!("corrupt timestamp for '{source_id}': {e}"))
        })?
        .with_timezone(&Utc);

    Ok(LedgerEntry {
        source_id,
        content_hash,
        remote_ref: remote_ref.map(RemoteRef::new),
        updated_at,
    })
}
