//! Last-run watermark persistence
//!
//! The watermark file holds a single RFC 3339 timestamp. A missing, empty
//! or unparsable file is the zero watermark.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use photovault_core::domain::Watermark;
use tracing::{debug, info, warn};

use crate::{fsutil, BackupError};

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Watermark {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let watermark = Watermark::parse_lenient(&content);
                if watermark.is_zero() && !content.trim().is_empty() {
                    warn!(path = %self.path.display(), "Unparsable watermark, treating as zero");
                }
                watermark
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No watermark yet");
                Watermark::zero()
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to read watermark, treating as zero");
                Watermark::zero()
            }
        }
    }

    pub async fn save(&self, watermark: Watermark) -> Result<(), BackupError> {
        let Some(instant) = watermark.instant() else {
            return Err(BackupError::Watermark(
                "refusing to persist the zero watermark".to_string(),
            ));
        };
        let content = instant.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        fsutil::write_atomic(&self.path, content.as_bytes())
            .await
            .map_err(|err| {
                BackupError::Watermark(format!("failed to write {}: {err}", self.path.display()))
            })?;
        info!(watermark = %content, "Watermark advanced");
        Ok(())
    }
}
