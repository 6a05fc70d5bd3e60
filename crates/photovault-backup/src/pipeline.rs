//! Per-group upload pipeline
//!
//! Drives one [`Group`] through the [`GroupState`] machine:
//!
//! ```text
//! Pending -> Building -> Built -> Uploading -> Uploaded -> [Verifying] -> Completed
//!               |                    |                          |
//!               +--------------------+--------------------------+--> Failed(kind)
//! ```
//!
//! A group already present in the ledger never enters the machine.
//! Uploads are retried with a linear backoff; verification is skipped for
//! archival storage tiers and is advisory unless strict mode is enabled.
//! On completion the ledger is flushed and the local archive deleted; on
//! upload or verification failure the archive is kept for inspection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use photovault_core::{
    config::{StorageConfig, UploadConfig},
    domain::{ArchiveUnit, FailureKind, Group, GroupKey, GroupState, UploadRecord},
    ports::IObjectStore,
};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    archive::{ArchiveBuilder, FileCallback},
    ledger::ProgressLedger,
    progress::{ProgressEvent, ProgressSender, RunCounters},
    BackupError,
};

/// How a group left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// Already recorded in the ledger; nothing was done
    Skipped,
    /// Uploaded and recorded
    Completed,
    /// Abandoned for this run
    Failed(FailureKind),
}

/// Retry and verification policy
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub verify: bool,
    pub strict_verification: bool,
    pub storage_class: Option<String>,
}

impl UploadPolicy {
    /// Verification is turned off for archival tiers, whose objects cannot
    /// be read back right after the write.
    pub fn from_config(upload: &UploadConfig, storage: &StorageConfig) -> Self {
        Self {
            max_attempts: upload.max_attempts.max(1),
            backoff_unit: Duration::from_millis(upload.retry_backoff_ms),
            verify: upload.verify && !storage.is_cold_tier(),
            strict_verification: upload.strict_verification,
            storage_class: storage.storage_class.clone(),
        }
    }

    /// Delay before `attempt` (1-based): none before the first, then one
    /// more unit per attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt.saturating_sub(1)
    }
}

/// Everything a worker needs to process groups
///
/// Cheap to clone; all shared state is behind `Arc`s.
#[derive(Clone)]
pub struct UploadPipeline {
    builder: ArchiveBuilder,
    store: Arc<dyn IObjectStore>,
    ledger: Arc<ProgressLedger>,
    counters: Arc<RunCounters>,
    progress: ProgressSender,
    storage: StorageConfig,
    policy: UploadPolicy,
}

impl UploadPipeline {
    pub fn new(
        builder: ArchiveBuilder,
        store: Arc<dyn IObjectStore>,
        ledger: Arc<ProgressLedger>,
        counters: Arc<RunCounters>,
        storage: StorageConfig,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            builder,
            store,
            ledger,
            counters,
            progress: ProgressSender::disabled(),
            storage,
            policy,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn counters(&self) -> &Arc<RunCounters> {
        &self.counters
    }

    pub fn ledger(&self) -> &Arc<ProgressLedger> {
        &self.ledger
    }

    /// Runs `group` to a terminal state
    #[instrument(skip(self, group), fields(group = %group.key(), files = group.len()))]
    pub async fn run(&self, group: Group) -> GroupOutcome {
        let key = group.key();
        if self.ledger.is_completed(key).await {
            info!("Group already uploaded, skipping");
            self.progress.emit(ProgressEvent::GroupSkipped { group: key });
            return GroupOutcome::Skipped;
        }

        let mut state = GroupState::Pending;

        // --- Building ---
        advance(&mut state, GroupState::Building);
        self.progress.emit(ProgressEvent::ArchiveStarted {
            group: key,
            files: group.len(),
        });
        let archive = match self.builder.build(&group, self.file_callback(key)).await {
            Ok(archive) => archive,
            Err(err) => {
                error!(error = %err, "Archive build failed");
                return self.fail(key, &mut state, &err);
            }
        };
        advance(&mut state, GroupState::Built);
        self.progress.emit(ProgressEvent::ArchiveBuilt {
            group: key,
            archive: archive.name().to_string(),
        });

        // --- Uploading ---
        let remote_key = self.storage.remote_key(key, archive.name());
        advance(&mut state, GroupState::Uploading);
        if let Err(err) = self.upload_with_retry(key, &archive, &remote_key).await {
            error!(
                error = %err,
                archive = %archive.local_path().display(),
                "Upload failed, archive kept for inspection"
            );
            return self.fail(key, &mut state, &err);
        }
        advance(&mut state, GroupState::Uploaded);
        self.progress.emit(ProgressEvent::UploadCompleted {
            group: key,
            remote_key: remote_key.clone(),
        });

        // --- Verifying ---
        let mut checksum = None;
        if self.policy.verify {
            advance(&mut state, GroupState::Verifying);
            match self.verify(&archive, &remote_key).await {
                Ok(digest) => {
                    debug!(sha256 = %digest, "Checksum verified");
                    checksum = Some(digest);
                }
                Err(err) => {
                    self.progress.emit(ProgressEvent::VerificationMismatch {
                        group: key,
                        reason: err.to_string(),
                    });
                    if self.policy.strict_verification {
                        error!(error = %err, "Verification failed, archive kept for inspection");
                        return self.fail(key, &mut state, &err);
                    }
                    error!(error = %err, "Verification failed, completing anyway");
                }
            }
        }

        // --- Completed ---
        advance(&mut state, GroupState::Completed);
        let record = UploadRecord {
            group_key: key,
            remote_key: remote_key.clone(),
            archive_name: archive.name().to_string(),
            completed_at: Utc::now(),
            sha256: checksum,
        };
        if let Err(err) = self.ledger.complete(record).await {
            error!(error = %err, "Failed to save ledger after upload");
            self.counters.record_ledger_failure();
        }

        if let Err(err) = tokio::fs::remove_file(archive.local_path()).await {
            warn!(
                path = %archive.local_path().display(),
                error = %err,
                "Failed to delete local archive"
            );
        }

        info!(remote_key = %remote_key, "Group completed");
        self.progress.emit(ProgressEvent::GroupCompleted {
            group: key,
            remote_key,
        });
        GroupOutcome::Completed
    }

    fn file_callback(&self, key: GroupKey) -> FileCallback {
        let counters = Arc::clone(&self.counters);
        let progress = self.progress.clone();
        Arc::new(move |_entry| {
            let completed = counters.file_archived();
            progress.emit(ProgressEvent::FileArchived {
                group: key,
                completed,
                total: counters.total_files(),
            });
        })
    }

    async fn upload_with_retry(
        &self,
        key: GroupKey,
        archive: &ArchiveUnit,
        remote_key: &str,
    ) -> Result<(), BackupError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }

            self.progress.emit(ProgressEvent::UploadAttempt {
                group: key,
                attempt,
                max_attempts,
            });
            match self
                .store
                .put_file(
                    remote_key,
                    archive.local_path(),
                    self.policy.storage_class.as_deref(),
                )
                .await
            {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, remote_key, "Upload succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, max_attempts, remote_key, error = %err, "Upload attempt failed");
                    last_error = Some(err);
                }
            }
        }

        Err(BackupError::UploadFailed {
            remote_key: remote_key.to_string(),
            attempts: max_attempts,
            reason: last_error
                .map(|err| format!("{err:#}"))
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }

    /// Compares the SHA-256 of the local archive with the stored object
    async fn verify(&self, archive: &ArchiveUnit, remote_key: &str) -> Result<String, BackupError> {
        let mismatch = |reason: String| BackupError::VerificationFailed {
            remote_key: remote_key.to_string(),
            reason,
        };

        let local = sha256_file(archive.local_path())
            .await
            .map_err(|err| mismatch(format!("failed to hash local archive: {err}")))?;
        let remote = self
            .store
            .get(remote_key)
            .await
            .map_err(|err| mismatch(format!("failed to fetch remote object: {err:#}")))?;
        let remote = sha256_hex(&remote);

        if local == remote {
            Ok(local)
        } else {
            Err(mismatch(format!("local {local} != remote {remote}")))
        }
    }

    fn fail(&self, key: GroupKey, state: &mut GroupState, err: &BackupError) -> GroupOutcome {
        let kind = err.failure_kind().unwrap_or(FailureKind::UploadFailed);
        advance(state, GroupState::Failed(kind));
        self.counters.record_failure(kind);
        self.progress.emit(ProgressEvent::GroupFailed {
            group: key,
            kind,
            reason: err.to_string(),
        });
        GroupOutcome::Failed(kind)
    }
}

fn advance(state: &mut GroupState, next: GroupState) {
    if let Err(err) = state.transition_to(next) {
        error!(error = %err, "Unexpected group state transition");
        *state = next;
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .unwrap_or_else(|join_err| Err(std::io::Error::other(join_err.to_string())))
}
