//! Progress ledger
//!
//! A JSON file recording which groups were durably uploaded, so an
//! interrupted run can resume without redoing finished groups. Deleting the
//! file forces every group to be uploaded again.
//!
//! ```json
//! {
//!   "window": "2024-03-01T00:00:00Z",
//!   "completed_groups": {
//!     "2024-03": { "group_key": "2024-03", "remote_key": "...", ... }
//!   }
//! }
//! ```
//!
//! `window` is the watermark the records were made under. Records from an
//! older window describe files that are already behind the watermark and
//! must not suppress uploads of newer files in the same month.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use photovault_core::domain::{GroupKey, UploadRecord, Watermark};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::{fsutil, BackupError};

/// In-memory ledger contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default, skip_serializing_if = "Watermark::is_zero")]
    window: Watermark,
    #[serde(default)]
    completed_groups: BTreeMap<GroupKey, UploadRecord>,
}

impl LedgerState {
    /// An empty ledger for the given watermark window
    pub fn for_window(window: Watermark) -> Self {
        Self {
            window,
            completed_groups: BTreeMap::new(),
        }
    }

    /// Reads the ledger at `path`; a missing file is an empty ledger
    pub async fn load(path: &Path) -> Result<Self, BackupError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No ledger yet");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(BackupError::Ledger(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&content).map_err(|err| {
            BackupError::Ledger(format!("failed to parse {}: {err}", path.display()))
        })
    }

    /// Writes the ledger atomically as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<(), BackupError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|err| BackupError::Ledger(format!("failed to serialize: {err}")))?;
        fsutil::write_atomic(path, &json).await.map_err(|err| {
            BackupError::Ledger(format!("failed to write {}: {err}", path.display()))
        })
    }

    /// Keeps the records if they belong to `watermark`, otherwise starts over
    pub fn scoped_to(self, watermark: Watermark) -> Self {
        if self.window == watermark {
            self
        } else {
            if !self.completed_groups.is_empty() {
                info!(
                    stale = self.completed_groups.len(),
                    window = %self.window,
                    "Ledger belongs to an earlier run window, starting fresh"
                );
            }
            Self::for_window(watermark)
        }
    }

    pub fn window(&self) -> Watermark {
        self.window
    }

    pub fn contains(&self, key: GroupKey) -> bool {
        self.completed_groups.contains_key(&key)
    }

    /// Adds a record; returns false and keeps the existing one if the group
    /// is already recorded
    pub fn record(&mut self, record: UploadRecord) -> bool {
        if self.contains(record.group_key) {
            return false;
        }
        self.completed_groups.insert(record.group_key, record);
        true
    }

    pub fn records(&self) -> impl Iterator<Item = &UploadRecord> {
        self.completed_groups.values()
    }

    pub fn len(&self) -> usize {
        self.completed_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed_groups.is_empty()
    }
}

/// Ledger shared by the workers of one run
///
/// Every completion appends and flushes under one lock, so records reach
/// disk in completion order and a crash loses at most the in-flight group.
///
/// A ledger built with [`ProgressLedger::in_memory`] consults existing
/// records but never writes, for runs whose groups may be incomplete.
#[derive(Debug)]
pub struct ProgressLedger {
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
}

impl ProgressLedger {
    pub fn new(path: impl Into<PathBuf>, state: LedgerState) -> Self {
        Self {
            path: Some(path.into()),
            state: Mutex::new(state),
        }
    }

    pub fn in_memory(state: LedgerState) -> Self {
        Self {
            path: None,
            state: Mutex::new(state),
        }
    }

    /// Backing file, `None` for an in-memory ledger
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn is_completed(&self, key: GroupKey) -> bool {
        self.state.lock().await.contains(key)
    }

    /// Records a completed group and flushes the ledger
    ///
    /// The record stays in memory even when the flush fails.
    #[instrument(skip(self, record), fields(group = %record.group_key))]
    pub async fn complete(&self, record: UploadRecord) -> Result<(), BackupError> {
        let mut state = self.state.lock().await;
        if !state.record(record) {
            debug!("Group already recorded");
            return Ok(());
        }
        match &self.path {
            Some(path) => state.save(path).await,
            None => Ok(()),
        }
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }
}
