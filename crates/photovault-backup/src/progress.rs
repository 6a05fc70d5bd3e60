//! Progress events and shared run counters
//!
//! Workers never render anything themselves. They publish [`ProgressEvent`]s
//! through a [`ProgressSender`]; a single consumer (the CLI) owns the
//! terminal. Counters shared between workers live in [`RunCounters`], each
//! behind its own lock.

use std::sync::{Mutex, MutexGuard};

use photovault_core::domain::{FailureKind, GroupKey};
use serde::Serialize;
use tokio::sync::mpsc;

// ============================================================================
// ProgressEvent
// ============================================================================

/// Observable milestones of a backup run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Groups are about to be fanned out
    RunStarted { groups: usize, files: usize },
    /// The ledger already holds a record for this group
    GroupSkipped { group: GroupKey },
    /// Archive building began
    ArchiveStarted { group: GroupKey, files: usize },
    /// One member file was written into an archive
    FileArchived {
        group: GroupKey,
        completed: u64,
        total: u64,
    },
    /// Archive finished and renamed into place
    ArchiveBuilt { group: GroupKey, archive: String },
    /// An upload attempt is starting
    UploadAttempt {
        group: GroupKey,
        attempt: u32,
        max_attempts: u32,
    },
    /// The object store accepted the archive
    UploadCompleted { group: GroupKey, remote_key: String },
    /// Local and remote checksums differ, or the remote object was unreadable
    VerificationMismatch { group: GroupKey, reason: String },
    /// The group reached `Completed`
    GroupCompleted { group: GroupKey, remote_key: String },
    /// The group reached `Failed`
    GroupFailed {
        group: GroupKey,
        kind: FailureKind,
        reason: String,
    },
    /// Every worker reached a terminal state
    RunFinished { completed: usize, failed: usize },
}

/// Sending half of the progress channel
///
/// A sender without a receiver, or whose receiver was dropped, silently
/// discards events.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sender that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

// ============================================================================
// RunCounters
// ============================================================================

/// Failure tallies for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub archives: usize,
    pub uploads: usize,
    pub verifications: usize,
    pub ledger_saves: usize,
}

impl FailureCounts {
    /// Groups that ended in `Failed`
    pub fn groups(&self) -> usize {
        self.archives + self.uploads + self.verifications
    }
}

/// Counters shared by every worker of a run
///
/// Failures and file progress are guarded by separate locks so that
/// a worker streaming files into an archive never contends with one
/// recording a failure.
#[derive(Debug)]
pub struct RunCounters {
    failures: Mutex<FailureCounts>,
    files_archived: Mutex<u64>,
    total_files: u64,
}

impl RunCounters {
    pub fn new(total_files: u64) -> Self {
        Self {
            failures: Mutex::new(FailureCounts::default()),
            files_archived: Mutex::new(0),
            total_files,
        }
    }

    /// Counts a group that ended in `Failed(kind)`
    pub fn record_failure(&self, kind: FailureKind) {
        let mut failures = lock(&self.failures);
        match kind {
            FailureKind::ArchiveWriteFailed => failures.archives += 1,
            FailureKind::UploadFailed => failures.uploads += 1,
            FailureKind::VerificationFailed => failures.verifications += 1,
        }
    }

    /// Counts a ledger save that did not reach disk
    pub fn record_ledger_failure(&self) {
        lock(&self.failures).ledger_saves += 1;
    }

    /// Counts one archived file and returns the new running total
    pub fn file_archived(&self) -> u64 {
        let mut files = lock(&self.files_archived);
        *files += 1;
        *files
    }

    pub fn failures(&self) -> FailureCounts {
        *lock(&self.failures)
    }

    pub fn files_archived(&self) -> u64 {
        *lock(&self.files_archived)
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }
}

/// Counter updates are single statements, so a poisoned lock still holds
/// a consistent value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
