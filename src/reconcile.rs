//! Sync reconciliation: the per-source state machine.
//!
//! For every logical source, independently and in order:
//!
//! 1. **Produce** an artifact (directory archive or database dump).
//! 2. **Fingerprint** it.
//! 3. **Compare** the digest with the ledger to pick a [`Decision`].
//! 4. **Upload** through the storage client unless the decision is to skip.
//! 5. **Commit** the new digest and remote reference to the ledger.
//! 6. **Cleanup** the temporary artifact, whatever happened before.
//!
//! The ledger is written only after a successful upload, so its digest always matches what
//! is stored remotely or predates a failed attempt. If the commit itself fails after an
//! upload, the stale ledger digest differs from the next run's artifact and the content is
//! uploaded again: redundant, but a real change is never skipped.
//!
//! Failures are contained per source. One source failing never prevents the others from
//! reaching a terminal state.

use crate::hasher::{hash_file, ContentDigest, HashAlgorithm};
use crate::ledger::{Ledger, LedgerEntry};
use crate::producer::{Artifact, ArtifactProducer};
use crate::report::{RunReport, SourceOutcome, SourceState, Step, UploadAction};
use crate::source::LogicalSource;
use crate::storage::{RemoteRef, StorageClient};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// What to do with a freshly fingerprinted artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Content matches what the ledger says is stored remotely
    Skip,
    /// Nothing recorded remotely for this source yet
    CreateNew,
    /// Content changed; replace the recorded remote object
    UpdateExisting { remote_ref: RemoteRef },
}

/// Compare a digest against the ledger entry for the same source.
///
/// A missing entry, or an entry without a remote reference, means nothing is known to be
/// stored remotely, so a new object is created.
pub fn decide(entry: Option<&LedgerEntry>, digest: &ContentDigest) -> Decision {
    match entry {
        Some(LedgerEntry {
            content_hash,
            remote_ref: Some(remote_ref),
            ..
        }) => {
            if content_hash == digest {
                Decision::Skip
            } else {
                Decision::UpdateExisting {
                    remote_ref: remote_ref.clone(),
                }
            }
        }
        _ => Decision::CreateNew,
    }
}

/// Settings a reconciler needs for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Directory temporary artifacts are materialised in
    pub staging_dir: PathBuf,
    pub hash_algorithm: HashAlgorithm,
    /// Parent location new remote objects are created under
    pub remote_parent: String,
}

/// Decision a dry run would take for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Decided {
        digest: ContentDigest,
        #[serde(flatten)]
        decision: Decision,
    },
    Failed {
        step: Step,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSource {
    pub source_id: String,
    pub kind: String,
    #[serde(flatten)]
    pub outcome: PlanOutcome,
}

type StepResult<T> = std::result::Result<T, (Step, Error)>;

/// Drives reconciliation of a list of sources against one ledger and one storage client
#[derive(Clone)]
pub struct Reconciler {
    settings: ReconcileSettings,
    producer: Arc<dyn ArtifactProducer>,
    ledger: Arc<dyn Ledger>,
    storage: Arc<dyn StorageClient>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcileSettings,
        producer: Arc<dyn ArtifactProducer>,
        ledger: Arc<dyn Ledger>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            settings,
            producer,
            ledger,
            storage,
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Reconcile every source once
    pub async fn run(&self, sources: &[LogicalSource]) -> RunReport {
        self.run_until_cancelled(sources, &CancellationToken::new()).await
    }

    /// Reconcile sources in order, stopping between sources once `cancel` fires.
    ///
    /// A source that has started always runs to a terminal state, so cancellation never
    /// leaves an upload without its ledger commit.
    pub async fn run_until_cancelled(
        &self,
        sources: &[LogicalSource],
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport::begin();
        info!(run_id = %report.run_id, "Reconciling {} sources", sources.len());

        for source in sources {
            if cancel.is_cancelled() {
                warn!(
                    "Run cancelled, {} sources not started",
                    sources.len() - report.outcomes.len()
                );
                return report.finish(true);
            }
            report.outcomes.push(self.reconcile_source(source).await);
        }

        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            "Run finished: {} uploaded, {} skipped, {} failed",
            summary.uploaded, summary.skipped, summary.failed
        );
        report.finish(false)
    }

    /// Run the full state machine for one source
    pub async fn reconcile_source(&self, source: &LogicalSource) -> SourceOutcome {
        let span = info_span!("reconcile", source = %source.id);
        let state = async {
            let artifact = match self.produce(source).await {
                Ok(artifact) => artifact,
                Err(failure) => return failed(failure),
            };

            let state = match self.sync_artifact(source, &artifact).await {
                Ok(state) => state,
                Err(failure) => failed(failure),
            };

            cleanup(artifact);
            state
        }
        .instrument(span)
        .await;

        SourceOutcome {
            source_id: source.id.clone(),
            kind: source.kind.label().to_string(),
            state,
        }
    }

    /// Produce, fingerprint and compare every source without uploading or committing
    pub async fn plan(&self, sources: &[LogicalSource]) -> Vec<PlannedSource> {
        self.plan_until_cancelled(sources, &CancellationToken::new()).await
    }

    /// Like [`Reconciler::plan`], stopping between sources once `cancel` fires. Only the
    /// sources planned before that point are returned.
    pub async fn plan_until_cancelled(
        &self,
        sources: &[LogicalSource],
        cancel: &CancellationToken,
    ) -> Vec<PlannedSource> {
        let mut planned = Vec::with_capacity(sources.len());

        for source in sources {
            if cancel.is_cancelled() {
                warn!(
                    "Plan cancelled, {} sources not started",
                    sources.len() - planned.len()
                );
                break;
            }
            let span = info_span!("plan", source = %source.id);
            let outcome = async {
                let artifact = match self.produce(source).await {
                    Ok(artifact) => artifact,
                    Err((step, e)) => return PlanOutcome::Failed { step, reason: e.to_string() },
                };

                let outcome = match self.fingerprint_and_compare(source, &artifact).await {
                    Ok((digest, decision)) => PlanOutcome::Decided { digest, decision },
                    Err((step, e)) => PlanOutcome::Failed { step, reason: e.to_string() },
                };

                cleanup(artifact);
                outcome
            }
            .instrument(span)
            .await;

            planned.push(PlannedSource {
                source_id: source.id.clone(),
                kind: source.kind.label().to_string(),
                outcome,
            });
        }

        planned
    }

    async fn produce(&self, source: &LogicalSource) -> StepResult<Artifact> {
        let artifact = self
            .producer
            .produce(source, &self.settings.staging_dir)
            .await
            .map_err(|e| (Step::Produce, e))?;
        debug!("Produced {} ({} bytes)", artifact.object_name(), artifact.size());
        Ok(artifact)
    }

    async fn fingerprint_and_compare(
        &self,
        source: &LogicalSource,
        artifact: &Artifact,
    ) -> StepResult<(ContentDigest, Decision)> {
        let algorithm = self.settings.hash_algorithm;
        let path = artifact.path().to_path_buf();
        let digest = tokio::task::spawn_blocking(move || hash_file(algorithm, path))
            .await
            .map_err(|e| (Step::Fingerprint, Error::from(std::io::Error::other(e))))?
            .map_err(|e| (Step::Fingerprint, e))?;

        let entry = self
            .ledger
            .get(&source.id)
            .await
            .map_err(|e| (Step::Compare, e))?;

        let decision = decide(entry.as_ref(), &digest);
        debug!("Digest {} -> {:?}", digest.short(), decision);
        Ok((digest, decision))
    }

    async fn sync_artifact(
        &self,
        source: &LogicalSource,
        artifact: &Artifact,
    ) -> StepResult<SourceState> {
        let (digest, decision) = self.fingerprint_and_compare(source, artifact).await?;

        let (action, uploaded) = match decision {
            Decision::Skip => {
                info!("Unchanged ({}), skipping upload", digest.short());
                return Ok(SourceState::Skipped { digest });
            }
            Decision::CreateNew => {
                info!("No remote copy recorded, creating {}", artifact.object_name());
                let uploaded = self
                    .storage
                    .create_object(&self.settings.remote_parent, artifact.object_name(), artifact)
                    .await;
                (UploadAction::Created, uploaded)
            }
            Decision::UpdateExisting { remote_ref } => {
                info!("Content changed ({}), updating {}", digest.short(), remote_ref);
                let uploaded = self.storage.overwrite_object(&remote_ref, artifact).await;
                (UploadAction::Updated, uploaded)
            }
        };
        let remote_ref = uploaded.map_err(|e| (Step::Upload, e))?;

        // The remote copy is now ahead of the ledger until this write lands.
        self.ledger
            .upsert(&source.id, digest, &remote_ref)
            .await
            .map_err(|e| {
                warn!(
                    "Uploaded {} but could not record it; the next run will upload again",
                    remote_ref
                );
                (Step::Commit, e)
            })?;

        info!("Uploaded {} bytes as {}", artifact.size(), remote_ref);
        Ok(SourceState::Uploaded {
            action,
            digest,
            remote_ref,
        })
    }
}

fn failed((step, error): (Step, Error)) -> SourceState {
    warn!("Failed at {}: {}", step, error);
    SourceState::Failed {
        step,
        reason: error.to_string(),
    }
}

fn cleanup(artifact: Artifact) {
    let path = artifact.path().to_path_buf();
    if let Err(e) = artifact.discard() {
        warn!("Could not remove temporary artifact {}: {}", path.display(), e);
    }
}
