//! S3 object store (OpenDAL)
//!
//! Credentials come from the usual AWS environment variables and profile
//! files, resolved by OpenDAL. The storage class is fixed per operator, so
//! the per-call hint is only checked against the configured one.

use std::path::Path;

use anyhow::{bail, Context};
use opendal::{services::S3, Operator};
use photovault_core::{config::StorageConfig, ports::IObjectStore};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

/// S3 rejects multipart chunks smaller than 5 MiB
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    operator: Operator,
    bucket: String,
    storage_class: Option<String>,
}

impl S3ObjectStore {
    pub fn from_config(storage: &StorageConfig) -> anyhow::Result<Self> {
        if storage.bucket.trim().is_empty() {
            bail!("storage.bucket is required for the s3 backend");
        }

        let mut builder = S3::default()
            .bucket(&storage.bucket)
            .region(&storage.region);
        if let Some(endpoint) = &storage.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(class) = &storage.storage_class {
            builder = builder.default_storage_class(class);
        }

        let operator = Operator::new(builder)
            .context("failed to configure S3 operator")?
            .finish();

        Ok(Self {
            operator,
            bucket: storage.bucket.clone(),
            storage_class: storage.storage_class.clone(),
        })
    }

    fn check_class(&self, requested: Option<&str>) {
        if let Some(requested) = requested {
            if self.storage_class.as_deref() != Some(requested) {
                warn!(
                    requested,
                    configured = ?self.storage_class,
                    "Storage class differs from the operator default"
                );
            }
        }
    }
}

#[async_trait::async_trait]
impl IObjectStore for S3ObjectStore {
    #[instrument(skip(self, data), fields(bucket = %self.bucket, bytes = data.len()))]
    async fn put(&self, key: &str, data: Vec<u8>, storage_class: Option<&str>) -> anyhow::Result<()> {
        self.check_class(storage_class);
        self.operator
            .write(key, data)
            .await
            .with_context(|| format!("failed to write s3://{}/{key}", self.bucket))?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        storage_class: Option<&str>,
    ) -> anyhow::Result<()> {
        self.check_class(storage_class);
        let mut file = tokio::fs::File::open(source)
            .await
            .with_context(|| format!("failed to open {}", source.display()))?;
        let mut writer = self
            .operator
            .writer_with(key)
            .chunk(CHUNK_SIZE)
            .await
            .with_context(|| format!("failed to start upload of s3://{}/{key}", self.bucket))?;

        let mut sent = 0u64;
        loop {
            let mut chunk = Vec::with_capacity(CHUNK_SIZE);
            let read = (&mut file)
                .take(CHUNK_SIZE as u64)
                .read_to_end(&mut chunk)
                .await
                .with_context(|| format!("failed to read {}", source.display()))?;
            if read == 0 {
                break;
            }
            sent += read as u64;
            if let Err(err) = writer.write(chunk).await {
                let _ = writer.abort().await;
                return Err(err)
                    .with_context(|| format!("failed to upload s3://{}/{key}", self.bucket));
            }
        }

        writer
            .close()
            .await
            .with_context(|| format!("failed to finish s3://{}/{key}", self.bucket))?;
        debug!(bytes = sent, "Upload finished");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let buffer = self
            .operator
            .read(key)
            .await
            .with_context(|| format!("failed to read s3://{}/{key}", self.bucket))?;
        Ok(buffer.to_vec())
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
