//! Media entries discovered by the scanner
//!
//! A [`MediaEntry`] is immutable once discovered and lives for one run.
//! [`ExclusionSummary`] counts what the scanner skipped, per extension.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an entry's resolved timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Capture time read from embedded media metadata
    Captured,
    /// Filesystem modification time (metadata absent or unreadable)
    Modified,
}

/// Metadata resolved from a media file by an [`IMetadataReader`](crate::ports::IMetadataReader)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedMetadata {
    /// When the photo or video was captured
    pub captured_at: Option<DateTime<Utc>>,
    /// Camera model
    pub camera: Option<String>,
    /// Latitude/longitude in decimal degrees
    pub location: Option<(f64, f64)>,
}

/// An eligible file discovered during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    path: PathBuf,
    resolved_at: DateTime<Utc>,
    source: TimestampSource,
    size_hint: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<(f64, f64)>,
}

impl MediaEntry {
    /// Creates an entry with no descriptive metadata
    pub fn new(
        path: impl Into<PathBuf>,
        resolved_at: DateTime<Utc>,
        source: TimestampSource,
        size_hint: u64,
    ) -> Self {
        Self {
            path: path.into(),
            resolved_at,
            source,
            size_hint,
            camera: None,
            location: None,
        }
    }

    /// Attaches camera and location details from resolved metadata
    #[must_use]
    pub fn with_details(mut self, metadata: &CapturedMetadata) -> Self {
        self.camera = metadata.camera.clone();
        self.location = metadata.location;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn source(&self) -> TimestampSource {
        self.source
    }

    pub fn size_hint(&self) -> u64 {
        self.size_hint
    }

    pub fn camera(&self) -> Option<&str> {
        self.camera.as_deref()
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        self.location
    }

    /// Base filename, lossily converted for non-UTF-8 names
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Duplicate-detection identity: timestamp to the second plus base filename
    pub fn identity_key(&self) -> (String, String) {
        (
            self.resolved_at.format("%Y%m%dT%H%M%S").to_string(),
            self.file_name(),
        )
    }
}

/// Per-extension count of entries the scanner did not consider
///
/// Extensions are stored lower-cased with their leading dot; files with no
/// extension are counted under the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSummary(BTreeMap<String, usize>);

impl ExclusionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one skipped entry with the given extension
    pub fn record(&mut self, extension: &str) {
        *self.0.entry(extension.to_lowercase()).or_insert(0) += 1;
    }

    /// Count for a single extension
    pub fn count(&self, extension: &str) -> usize {
        self.0.get(&extension.to_lowercase()).copied().unwrap_or(0)
    }

    /// Total number of excluded entries
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(ext, count)| (ext.as_str(), *count))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn identity_key_truncates_to_seconds() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()
            + chrono::Duration::milliseconds(750);
        let entry = MediaEntry::new("/lib/a/IMG_1.jpg", t, TimestampSource::Captured, 10);
        assert_eq!(
            entry.identity_key(),
            ("20240305T102030".to_string(), "IMG_1.jpg".to_string())
        );
    }

    #[test]
    fn identity_key_ignores_directory() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap();
        let a = MediaEntry::new("/lib/a/IMG_1.jpg", t, TimestampSource::Captured, 1);
        let b = MediaEntry::new("/lib/b/IMG_1.jpg", t, TimestampSource::Modified, 2);
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn with_details_copies_camera_and_location() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap();
        let meta = CapturedMetadata {
            captured_at: Some(t),
            camera: Some("X100V".to_string()),
            location: Some((48.85, 2.35)),
        };
        let entry =
            MediaEntry::new("/lib/a.jpg", t, TimestampSource::Captured, 0).with_details(&meta);
        assert_eq!(entry.camera(), Some("X100V"));
        assert_eq!(entry.location(), Some((48.85, 2.35)));
    }

    #[test]
    fn exclusion_summary_counts_case_insensitively() {
        let mut summary = ExclusionSummary::new();
        summary.record(".TXT");
        summary.record(".txt");
        summary.record("");
        assert_eq!(summary.count(".txt"), 2);
        assert_eq!(summary.count(""), 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.iter().count(), 2);
    }
}
