//! Small filesystem helpers shared by the state stores

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Writes `data` to `path` via a sibling temporary file and a rename,
/// so readers never observe a half-written file.
///
/// The temporary file is synced before the rename and the parent directory
/// after it, so a completed call survives a power loss.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = temp_sibling(path);
    debug!(?tmp_path, bytes = data.len(), "writing to temporary file");
    if let Err(err) = write_synced(&tmp_path, data).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    // Directories cannot be opened for syncing on every platform
    if let Some(parent) = parent {
        if let Ok(dir) = tokio::fs::File::open(parent).await {
            if let Err(err) = dir.sync_all().await {
                debug!(error = %err, "directory sync not supported");
            }
        }
    }
    Ok(())
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/state.json");

        write_atomic(&target, b"first").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(!temp_sibling(&target).exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target makes the rename fail
        let target = dir.path().join("state.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        assert!(write_atomic(&target, b"data").await.is_err());
        assert!(!temp_sibling(&target).exists());
        assert!(target.join("occupied").is_dir());
    }
}
