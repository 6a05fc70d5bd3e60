//! PhotoVault Backup - Incremental backup orchestrator
//!
//! Provides:
//! - Change detection against a last-run watermark
//! - Duplicate detection and calendar-month grouping
//! - Archive building, upload with bounded retry, checksum verification
//! - A durable progress ledger enabling resume after interrupted runs
//! - Bounded-concurrency fan-out of groups with a full join barrier
//!
//! ## Modules
//!
//! - [`scanner`] - Walks the library and resolves timestamps
//! - [`partition`] - Deduplication and month grouping
//! - [`archive`] - `.tar.gz` archive builder
//! - [`pipeline`] - Per-group build/upload/verify state machine
//! - [`controller`] - Admission gate and join barrier over pipelines
//! - [`ledger`] - Progress ledger persistence
//! - [`watermark`] - Last-run watermark persistence
//! - [`progress`] - Progress events and shared run counters
//! - [`manifest`] - Metadata manifest upload
//! - [`engine`] - Run-level orchestration

pub mod archive;
pub mod controller;
pub mod engine;
pub mod ledger;
pub mod manifest;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod watermark;

mod fsutil;

use photovault_core::domain::{DomainError, FailureKind, GroupKey};
use thiserror::Error;

pub use engine::{BackupEngine, BackupPlan, RunReport, StatusReport};

/// Errors that can occur while backing up a library
#[derive(Debug, Error)]
pub enum BackupError {
    /// The archive for a group could not be written
    #[error("Failed to write archive for {group}: {source}")]
    ArchiveWriteFailed {
        group: GroupKey,
        #[source]
        source: std::io::Error,
    },

    /// Every upload attempt failed
    #[error("Upload of {remote_key} failed after {attempts} attempts: {reason}")]
    UploadFailed {
        remote_key: String,
        attempts: u32,
        reason: String,
    },

    /// The remote object could not be fetched or its checksum differs
    #[error("Verification of {remote_key} failed: {reason}")]
    VerificationFailed { remote_key: String, reason: String },

    /// The progress ledger could not be read or written
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The watermark could not be written
    #[error("Watermark error: {0}")]
    Watermark(String),

    /// An I/O error outside archive building
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A domain-level error propagated from photovault-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl BackupError {
    /// The group failure this error counts as, if it terminates a group
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            BackupError::ArchiveWriteFailed { .. } => Some(FailureKind::ArchiveWriteFailed),
            BackupError::UploadFailed { .. } => Some(FailureKind::UploadFailed),
            BackupError::VerificationFailed { .. } => Some(FailureKind::VerificationFailed),
            _ => None,
        }
    }
}

/// Result type for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;
