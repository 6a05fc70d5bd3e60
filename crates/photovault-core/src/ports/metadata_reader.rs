//! Media metadata port (driven/secondary port)
//!
//! Resolves capture time, camera model and GPS position from a media file.
//! Parsing of any particular tag format lives entirely in the adapter.

use std::path::Path;

use crate::domain::CapturedMetadata;

/// Port trait for reading embedded media metadata
///
/// Callers treat any error, and any result whose `captured_at` is `None`,
/// as "no capture time" and fall back to the filesystem modification time.
#[async_trait::async_trait]
pub trait IMetadataReader: Send + Sync {
    /// Reads metadata from the file at `path`
    async fn resolve(&self, path: &Path) -> anyhow::Result<CapturedMetadata>;
}

/// Reader that never finds embedded metadata
///
/// Every entry resolves to its modification time. Used when metadata
/// extraction is disabled and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait::async_trait]
impl IMetadataReader for NoMetadata {
    async fn resolve(&self, _path: &Path) -> anyhow::Result<CapturedMetadata> {
        Ok(CapturedMetadata::default())
    }
}
