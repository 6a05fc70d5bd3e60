//! Object store port (driven/secondary port)
//!
//! This module defines the interface for the remote storage backend that
//! receives finished archives.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification. The upload pipeline retries
//!   every error uniformly; transient and permanent failures are not told apart.
//! - The bucket is a property of the adapter instance, not of each call.

use std::path::Path;

/// Port trait for object storage operations
///
/// ## Implementation Notes
///
/// - `put` must be a whole-object write: after `Ok(())` a `get` of the same
///   key returns exactly the bytes that were put.
/// - Implementations should not retry internally; the pipeline owns the
///   retry policy.
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Writes `data` under `key`
    ///
    /// # Arguments
    /// * `key` - Remote object key (e.g. `2024/2024-03_20240315T101500.042.tar.gz`)
    /// * `data` - Full object contents
    /// * `storage_class` - Optional storage tier hint (e.g. `STANDARD`, `GLACIER`)
    async fn put(&self, key: &str, data: Vec<u8>, storage_class: Option<&str>)
        -> anyhow::Result<()>;

    /// Writes the contents of the local file at `source` under `key`
    ///
    /// The default reads the whole file and delegates to [`put`](Self::put);
    /// adapters that can stream should override it.
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        storage_class: Option<&str>,
    ) -> anyhow::Result<()> {
        let data = tokio::fs::read(source).await?;
        self.put(key, data, storage_class).await
    }

    /// Reads the full contents of the object stored under `key`
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    /// Human-readable description of the backend, used in logs
    fn describe(&self) -> String;
}
