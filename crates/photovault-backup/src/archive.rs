//! Archive builder
//!
//! Packs a group's members into one gzip-compressed tar file. Each member is
//! stored under its base filename; clashing names get a numeric suffix.
//!
//! The archive is written to `<name>.partial` and renamed only after the
//! gzip stream is finished and synced, so a failed build never leaves a file
//! that looks like a completed archive.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use flate2::{write::GzEncoder, Compression};
use photovault_core::domain::{ArchiveUnit, Group, MediaEntry};
use tracing::{debug, instrument, warn};

use crate::BackupError;

/// Called from the writer thread after each member is appended
pub type FileCallback = Arc<dyn Fn(&MediaEntry) + Send + Sync>;

/// Builds `.tar.gz` archives in a staging directory
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    work_dir: PathBuf,
    compression_level: u32,
}

impl ArchiveBuilder {
    pub fn new(work_dir: impl Into<PathBuf>, compression_level: u32) -> Self {
        Self {
            work_dir: work_dir.into(),
            compression_level: compression_level.min(9),
        }
    }

    /// Writes the archive for `group`, invoking `on_file` once per member
    #[instrument(skip(self, group, on_file), fields(group = %group.key(), files = group.len()))]
    pub async fn build(
        &self,
        group: &Group,
        on_file: FileCallback,
    ) -> Result<ArchiveUnit, BackupError> {
        let key = group.key();
        let name = ArchiveUnit::generate_name(key, Utc::now());
        let final_path = self.work_dir.join(&name);
        let partial_path = self.work_dir.join(format!("{name}.partial"));

        let work_dir = self.work_dir.clone();
        let members = group.members().to_vec();
        let level = self.compression_level;
        let partial = partial_path.clone();
        let target = final_path.clone();

        let outcome = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&work_dir)?;
            if let Err(err) = write_archive(&partial, &members, level, on_file.as_ref()) {
                let _ = std::fs::remove_file(&partial);
                return Err(err);
            }
            std::fs::rename(&partial, &target)
        })
        .await
        .unwrap_or_else(|join_err| Err(std::io::Error::other(join_err.to_string())));

        match outcome {
            Ok(()) => {
                debug!(archive = %name, "Archive written");
                Ok(ArchiveUnit::new(key, name, final_path))
            }
            Err(source) => {
                if partial_path.exists() {
                    warn!(path = %partial_path.display(), "Removing partial archive");
                    let _ = tokio::fs::remove_file(&partial_path).await;
                }
                Err(BackupError::ArchiveWriteFailed { group: key, source })
            }
        }
    }
}

fn write_archive(
    path: &Path,
    members: &[MediaEntry],
    level: u32,
    on_file: &(dyn Fn(&MediaEntry) + Send + Sync),
) -> std::io::Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    let mut tar = tar::Builder::new(encoder);
    let mut names = EntryNames::default();

    for member in members {
        let name = names.claim(&member.file_name());
        tar.append_path_with_name(member.path(), &name)?;
        on_file(member);
    }

    let encoder = tar.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()
}

/// Names already used inside one archive
#[derive(Debug, Default)]
struct EntryNames(HashSet<String>);

impl EntryNames {
    /// Returns `name`, or `stem-N.ext` with the smallest free `N`
    fn claim(&mut self, name: &str) -> String {
        if self.0.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        let mut n = 1usize;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            };
            if self.0.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
