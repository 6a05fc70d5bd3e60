//! Domain entities
//!
//! This module contains the core domain types for PhotoVault:
//! - Newtypes for group keys and the watermark
//! - Media entries and exclusion accounting
//! - Groups, archives, upload records and the group state machine
//! - Domain-specific error types

pub mod errors;
pub mod group;
pub mod media;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use group::{ArchiveUnit, FailureKind, Group, GroupState, UploadRecord, ARCHIVE_EXTENSION};
pub use media::{CapturedMetadata, ExclusionSummary, MediaEntry, TimestampSource};
pub use newtypes::{GroupKey, Watermark};
