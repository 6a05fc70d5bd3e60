//! PhotoVault Storage - Adapters for the core ports
//!
//! Provides:
//! - [`LocalObjectStore`] - Objects as files below a root directory
//! - [`S3ObjectStore`] - Amazon S3 and compatible services through OpenDAL
//! - [`ExifMetadataReader`] - Capture time, camera and GPS from EXIF
//!
//! [`object_store_from_config`] picks the store named by `storage.backend`.

pub mod exif_reader;
pub mod local;
pub mod s3;

use std::sync::Arc;

use anyhow::bail;
use photovault_core::{config::StorageConfig, ports::IObjectStore};

pub use exif_reader::ExifMetadataReader;
pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Builds the object store selected by `storage.backend`
pub fn object_store_from_config(storage: &StorageConfig) -> anyhow::Result<Arc<dyn IObjectStore>> {
    match storage.backend.as_str() {
        "local" => Ok(Arc::new(LocalObjectStore::new(&storage.local_root))),
        "s3" => Ok(Arc::new(S3ObjectStore::from_config(storage)?)),
        other => bail!("unknown storage backend '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_backend_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            backend: "local".to_string(),
            local_root: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let store = object_store_from_config(&storage).unwrap();
        assert!(store.describe().starts_with("local:"));

        let storage = StorageConfig {
            backend: "ftp".to_string(),
            ..StorageConfig::default()
        };
        assert!(object_store_from_config(&storage).is_err());
    }
}
