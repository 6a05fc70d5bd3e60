//! Directory-backed object store
//!
//! Each key maps to a file below the root. Writes go to a temporary sibling
//! and are renamed into place, so a reader never sees a partial object.
//! Storage class hints are ignored.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use photovault_core::ports::IObjectStore;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `key` below the root, rejecting keys that would escape it
    fn object_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        let mut has_name = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => has_name = true,
                Component::CurDir => {}
                _ => bail!("invalid object key '{key}'"),
            }
        }
        if !has_name {
            bail!("invalid object key '{key}'");
        }
        Ok(self.root.join(relative))
    }

    async fn prepare(&self, key: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut tmp = target.as_os_str().to_owned();
        tmp.push(".tmp");
        Ok((target, PathBuf::from(tmp)))
    }

    async fn commit(tmp: &Path, target: &Path) -> anyhow::Result<()> {
        if let Err(err) = tokio::fs::rename(tmp, target).await {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(err).with_context(|| format!("failed to move object into {}", target.display()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IObjectStore for LocalObjectStore {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put(&self, key: &str, data: Vec<u8>, _storage_class: Option<&str>) -> anyhow::Result<()> {
        let (target, tmp) = self.prepare(key).await?;
        debug!(?tmp, "writing to temporary file");
        tokio::fs::write(&tmp, &data)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        Self::commit(&tmp, &target).await
    }

    #[instrument(skip(self))]
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        _storage_class: Option<&str>,
    ) -> anyhow::Result<()> {
        let (target, tmp) = self.prepare(key).await?;
        let bytes = tokio::fs::copy(source, &tmp)
            .await
            .with_context(|| format!("failed to copy {}", source.display()))?;
        debug!(bytes, "copied to temporary file");
        Self::commit(&tmp, &target).await
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read object {key}"))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
