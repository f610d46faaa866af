//! Per-run outcome reporting.

use crate::hasher::ContentDigest;
use crate::storage::RemoteRef;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Step of the per-source state machine at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Produce,
    Fingerprint,
    Compare,
    Upload,
    Commit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Produce => "produce",
            Step::Fingerprint => "fingerprint",
            Step::Compare => "compare",
            Step::Upload => "upload",
            Step::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Which storage operation an upload used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadAction {
    Created,
    Updated,
}

/// Terminal state of one source in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceState {
    Skipped {
        digest: ContentDigest,
    },
    Uploaded {
        action: UploadAction,
        digest: ContentDigest,
        remote_ref: RemoteRef,
    },
    Failed {
        step: Step,
        reason: String,
    },
}

impl SourceState {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub kind: String,
    #[serde(flatten)]
    pub state: SourceState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub skipped: usize,
    pub uploaded: usize,
    pub failed: usize,
}

/// Outcome of a whole reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The run was stopped before every source was processed
    pub cancelled: bool,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    pub fn finish(mut self, cancelled: bool) -> Self {
        self.finished_at = Utc::now();
        self.cancelled = cancelled;
        self
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for outcome in &self.outcomes {
            match outcome.state {
                SourceState::Skipped { .. } => summary.skipped += 1,
                SourceState::Uploaded { .. } => summary.uploaded += 1,
                SourceState::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.state.is_failed())
    }

    pub fn outcome(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }

    /// Human-readable table, one line per source
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<24} {:<10} {:<10} DETAIL", "SOURCE", "KIND", "STATE");
        let _ = writeln!(out, "{}", "-".repeat(72));

        for outcome in &self.outcomes {
            let (state, detail) = match &outcome.state {
                SourceState::Skipped { digest } => ("skipped", format!("unchanged {}", digest.short())),
                SourceState::Uploaded {
                    action,
                    digest,
                    remote_ref,
                } => (
                    "uploaded",
                    format!(
                        "{} {} -> {}",
                        match action {
                            UploadAction::Created => "created",
                            UploadAction::Updated => "updated",
                        },
                        digest.short(),
                        remote_ref
                    ),
                ),
                SourceState::Failed { step, reason } => ("FAILED", format!("[{step}] {reason}")),
            };
            let _ = writeln!(
                out,
                "{:<24} {:<10} {:<10} {}",
                outcome.source_id, outcome.kind, state, detail
            );
        }

        let summary = self.summary();
        let _ = writeln!(
            out,
            "\n{} uploaded, {} skipped, {} failed{}",
            summary.uploaded,
            summary.skipped,
            summary.failed,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        out
    }

    pub async fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{hash_bytes, HashAlgorithm};
    use tempfile::TempDir;

    fn sample() -> RunReport {
        let digest = hash_bytes(HashAlgorithm::Blake3, b"X");
        let mut report = RunReport::begin();
        report.outcomes = vec![
            SourceOutcome {
                source_id: "docs".to_string(),
                kind: "directory".to_string(),
                state: SourceState::Uploaded {
                    action: UploadAction::Created,
                    digest,
                    remote_ref: RemoteRef::new("file-1"),
                },
            },
            SourceOutcome {
                source_id: "db1".to_string(),
                kind: "database".to_string(),
                state: SourceState::Skipped { digest },
            },
            SourceOutcome {
                source_id: "db2".to_string(),
                kind: "database".to_string(),
                state: SourceState::Failed {
                    step: Step::Produce,
                    reason: "mysqldump exited with 2".to_string(),
                },
            },
        ];
        report.finish(false)
    }

    #[test]
    fn test_summary_counts_each_terminal_state() {
        let report = sample();
        assert_eq!(
            report.summary(),
            RunSummary {
                skipped: 1,
                uploaded: 1,
                failed: 1
            }
        );
        assert!(report.has_failures());
    }

    #[test]
    fn test_table_lists_failure_reason() {
        let table = sample().render_table();
        assert!(table.contains("[produce] mysqldump exited with 2"));
        assert!(table.contains("1 uploaded, 1 skipped, 1 failed"));
    }

    #[tokio::test]
    async fn test_json_report_is_tagged_by_state() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("reports").join("run.json");
        sample().write_json(&path).await?;

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(value["outcomes"][0]["state"], "uploaded");
        assert_eq!(value["outcomes"][0]["action"], "created");
        assert_eq!(value["outcomes"][2]["step"], "produce");
        Ok(())
    }
}
