//! Change detector
//!
//! Walks the media library, splits files into eligible and excluded by
//! extension, resolves each eligible file's effective timestamp and keeps
//! only what is newer than the watermark.
//!
//! Per-entry problems (unreadable directory entries, metadata that fails to
//! decode, a failed `stat`) never abort the walk: the entry is skipped or
//! falls back to its modification time. A missing library root scans as
//! empty.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use photovault_core::{
    config::SourceConfig,
    domain::{ExclusionSummary, MediaEntry, TimestampSource, Watermark},
    ports::IMetadataReader,
};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Output of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Entries newer than the watermark, in traversal order
    pub eligible: Vec<MediaEntry>,
    /// Per-extension count of files with a disallowed extension
    pub excluded: ExclusionSummary,
}

/// A file with an allowed extension, before timestamp resolution
#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    modified: Option<DateTime<Utc>>,
    size: u64,
}

/// Scans a library through an [`IMetadataReader`]
pub struct Scanner {
    reader: Arc<dyn IMetadataReader>,
    allowed_extensions: Vec<String>,
}

impl Scanner {
    /// Extensions come from [`SourceConfig::normalized_extensions`]
    pub fn new(reader: Arc<dyn IMetadataReader>, source: &SourceConfig) -> Self {
        Self {
            reader,
            allowed_extensions: source.normalized_extensions(),
        }
    }

    /// Scans `root` for allowed files strictly newer than `watermark`
    ///
    /// Traversal order is deterministic (sorted by file name per directory),
    /// which makes "first occurrence wins" deduplication reproducible.
    #[instrument(skip(self), fields(root = %root.display(), watermark = %watermark))]
    pub async fn scan(&self, root: &Path, watermark: Watermark) -> anyhow::Result<ScanResult> {
        if !tokio::fs::metadata(root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            warn!(root = %root.display(), "Library is not a readable directory, nothing to scan");
            return Ok(ScanResult::default());
        }
        let root = root.to_path_buf();
        let allowed = self.allowed_extensions.clone();
        let (candidates, excluded) =
            tokio::task::spawn_blocking(move || walk(&root, &allowed))
                .await
                .context("library walk task failed")?;

        let mut eligible = Vec::new();
        for candidate in candidates {
            let Some(entry) = self.resolve(candidate).await else {
                continue;
            };
            if watermark.admits(&entry.resolved_at()) {
                eligible.push(entry);
            }
        }

        info!(
            eligible = eligible.len(),
            excluded = excluded.total(),
            "Scan complete"
        );
        Ok(ScanResult { eligible, excluded })
    }

    async fn resolve(&self, candidate: Candidate) -> Option<MediaEntry> {
        let metadata = match self.reader.resolve(&candidate.path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(path = %candidate.path.display(), error = %err, "No readable metadata");
                Default::default()
            }
        };

        let (resolved_at, source) = match (metadata.captured_at, candidate.modified) {
            (Some(captured), _) => (captured, TimestampSource::Captured),
            (None, Some(modified)) => (modified, TimestampSource::Modified),
            (None, None) => {
                debug!(path = %candidate.path.display(), "No usable timestamp, skipping");
                return None;
            }
        };

        Some(
            MediaEntry::new(candidate.path, resolved_at, source, candidate.size)
                .with_details(&metadata),
        )
    }
}

/// Blocking walk: classifies files by extension, stats only allowed ones
fn walk(root: &Path, allowed: &[String]) -> (Vec<Candidate>, ExclusionSummary) {
    let mut candidates = Vec::new();
    let mut excluded = ExclusionSummary::new();

    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "Skipping unreadable entry");
                None
            }
        });

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }

        let extension = extension_of(entry.path());
        if !allowed.contains(&extension) {
            excluded.record(&extension);
            continue;
        }

        let (modified, size) = match entry.metadata() {
            Ok(meta) => (meta.modified().ok().map(DateTime::<Utc>::from), meta.len()),
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "stat failed");
                (None, 0)
            }
        };

        candidates.push(Candidate {
            path: entry.into_path(),
            modified,
            size,
        });
    }

    (candidates, excluded)
}

/// Lower-cased extension with its leading dot, or `""` when there is none
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
