//! Upload groups and their archive/upload lifecycle
//!
//! A [`Group`] becomes exactly one [`ArchiveUnit`] and, once durably
//! uploaded, exactly one [`UploadRecord`]. [`GroupState`] is the per-group
//! state machine driven by the upload pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::media::MediaEntry;
use super::newtypes::GroupKey;

/// Extension of every archive produced by the archive builder
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Timestamp layout embedded in archive names
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// A calendar-month partition of eligible entries
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: GroupKey,
    members: Vec<MediaEntry>,
}

impl Group {
    pub fn new(key: GroupKey, members: Vec<MediaEntry>) -> Self {
        Self { key, members }
    }

    pub fn key(&self) -> GroupKey {
        self.key
    }

    /// Members in scan order
    pub fn members(&self) -> &[MediaEntry] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sum of member size hints in bytes
    pub fn total_bytes(&self) -> u64 {
        self.members.iter().map(MediaEntry::size_hint).sum()
    }
}

/// A packed archive on local disk, ready to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveUnit {
    group_key: GroupKey,
    name: String,
    local_path: PathBuf,
}

impl ArchiveUnit {
    pub fn new(group_key: GroupKey, name: impl Into<String>, local_path: PathBuf) -> Self {
        Self {
            group_key,
            name: name.into(),
            local_path,
        }
    }

    /// Generates `{group}_{timestamp}.tar.gz` for an archive created at `created_at`
    ///
    /// The timestamp carries millisecond resolution so archives of the same
    /// group built by different runs never share a name.
    pub fn generate_name(group_key: GroupKey, created_at: DateTime<Utc>) -> String {
        format!(
            "{}_{}.{}",
            group_key,
            created_at.format(ARCHIVE_TIMESTAMP_FORMAT),
            ARCHIVE_EXTENSION
        )
    }

    pub fn group_key(&self) -> GroupKey {
        self.group_key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}

/// Durable proof that a group's archive reached the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub group_key: GroupKey,
    pub remote_key: String,
    pub archive_name: String,
    pub completed_at: DateTime<Utc>,
    /// SHA-256 of the archive when verification ran and matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

// ============================================================================
// Group lifecycle
// ============================================================================

/// Why a group ended in [`GroupState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The archive could not be written
    ArchiveWriteFailed,
    /// Every upload attempt failed
    UploadFailed,
    /// Checksum mismatch with strict verification enabled
    VerificationFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ArchiveWriteFailed => write!(f, "archive_write_failed"),
            FailureKind::UploadFailed => write!(f, "upload_failed"),
            FailureKind::VerificationFailed => write!(f, "verification_failed"),
        }
    }
}

/// Per-group state machine
///
/// `Pending -> Building -> Built -> Uploading -> Uploaded -> [Verifying ->] Completed`,
/// with an absorbing `Failed` reachable from `Building`, `Uploading` and `Verifying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Pending,
    Building,
    Built,
    Uploading,
    Uploaded,
    Verifying,
    Completed,
    Failed(FailureKind),
}

impl GroupState {
    /// Returns the state name without payload
    pub fn name(&self) -> &'static str {
        match self {
            GroupState::Pending => "Pending",
            GroupState::Building => "Building",
            GroupState::Built => "Built",
            GroupState::Uploading => "Uploading",
            GroupState::Uploaded => "Uploaded",
            GroupState::Verifying => "Verifying",
            GroupState::Completed => "Completed",
            GroupState::Failed(_) => "Failed",
        }
    }

    pub fn can_transition_to(&self, target: &GroupState) -> bool {
        match (self, target) {
            (GroupState::Pending, GroupState::Building) => true,

            (GroupState::Building, GroupState::Built) => true,
            (GroupState::Building, GroupState::Failed(FailureKind::ArchiveWriteFailed)) => true,

            (GroupState::Built, GroupState::Uploading) => true,

            (GroupState::Uploading, GroupState::Uploaded) => true,
            (GroupState::Uploading, GroupState::Failed(FailureKind::UploadFailed)) => true,

            (GroupState::Uploaded, GroupState::Verifying) => true,
            (GroupState::Uploaded, GroupState::Completed) => true,

            (GroupState::Verifying, GroupState::Completed) => true,
            (GroupState::Verifying, GroupState::Failed(FailureKind::VerificationFailed)) => true,

            _ => false,
        }
    }

    /// Moves to `target`, rejecting transitions the machine does not allow
    pub fn transition_to(&mut self, target: GroupState) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl Default for GroupState {
    fn default() -> Self {
        GroupState::Pending
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupState::Failed(kind) => write!(f, "failed: {}", kind),
            other => write!(f, "{}", other.name().to_lowercase()),
        }
    }
}
