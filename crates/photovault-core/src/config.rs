//! Configuration module for PhotoVault.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::GroupKey;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for PhotoVault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub archive: ArchiveConfig,
    pub state: StateConfig,
    pub manifest: ManifestConfig,
    pub logging: LoggingConfig,
}

/// Media library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Root directory of the media library.
    pub library_path: PathBuf,
    /// Extensions eligible for backup, matched case-insensitively.
    pub allowed_extensions: Vec<String>,
    /// Maximum number of eligible files per run (0 = unlimited).
    pub limit: usize,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: `s3` or `local`.
    pub backend: String,
    /// Bucket name (`s3` backend).
    pub bucket: String,
    /// Region (`s3` backend).
    pub region: String,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    /// Root directory of the `local` backend.
    pub local_root: PathBuf,
    /// Storage class hint sent with every upload.
    pub storage_class: Option<String>,
    /// Remote key template; placeholders `{year}`, `{month}`, `{group}`, `{archive}`.
    pub key_format: String,
}

/// Upload pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum number of groups processed at once.
    pub max_concurrent: usize,
    /// Upload attempts per archive, including the first.
    pub max_attempts: u32,
    /// Backoff unit in milliseconds; attempt `n` waits `n - 1` units.
    pub retry_backoff_ms: u64,
    /// Read the object back and compare checksums after upload.
    pub verify: bool,
    /// Treat a checksum mismatch as a failed group instead of a logged error.
    pub strict_verification: bool,
}

/// Archive builder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory where archives are staged before upload.
    pub work_dir: PathBuf,
    /// Gzip compression level (0-9).
    pub compression_level: u32,
}

/// Durable run state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Progress ledger (JSON).
    pub ledger_file: PathBuf,
    /// Last-run watermark (RFC 3339 timestamp).
    pub watermark_file: PathBuf,
}

/// Metadata manifest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Upload a JSON manifest of the scanned files' metadata.
    pub enabled: bool,
    /// Remote key of the manifest.
    pub remote_key: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/photovault/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("photovault")
            .join("config.yaml")
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("photovault")
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            library_path: dirs::picture_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
                .unwrap_or_else(|| PathBuf::from("~/Pictures")),
            allowed_extensions: [".jpg", ".jpeg", ".png", ".heic", ".mov", ".mp4"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            limit: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "s3".to_string(),
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            local_root: data_dir().join("store"),
            storage_class: None,
            key_format: "{year}/{archive}".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            verify: true,
            strict_verification: false,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            work_dir: data_dir().join("staging"),
            compression_level: 6,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            ledger_file: data_dir.join("upload_state.json"),
            watermark_file: data_dir.join("last_upload.txt"),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote_key: "photo_metadata.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

/// Storage classes whose objects cannot be read back right after a write.
const COLD_STORAGE_CLASSES: &[&str] = &["GLACIER", "DEEP_ARCHIVE"];

impl SourceConfig {
    /// Allowed extensions lower-cased and dot-prefixed.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.allowed_extensions
            .iter()
            .map(|ext| ext.trim())
            .filter(|ext| !ext.is_empty())
            .map(|ext| {
                let ext = ext.to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect()
    }
}

impl StorageConfig {
    /// Expands `key_format` for an archive of `group`.
    pub fn remote_key(&self, group: GroupKey, archive_name: &str) -> String {
        self.key_format
            .replace("{year}", &format!("{:04}", group.year()))
            .replace("{month}", &format!("{:02}", group.month()))
            .replace("{group}", &group.to_string())
            .replace("{archive}", archive_name)
    }

    /// Returns true when the configured class is an archival tier.
    pub fn is_cold_tier(&self) -> bool {
        self.storage_class
            .as_deref()
            .map(|class| {
                COLD_STORAGE_CLASSES
                    .iter()
                    .any(|cold| cold.eq_ignore_ascii_case(class.trim()))
            })
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.max_concurrent"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `storage.backend`.
const VALID_BACKENDS: &[&str] = &["s3", "local"];

/// Upper bound for `upload.max_concurrent`.
const MAX_CONCURRENCY: usize = 64;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- source ---
        if self.source.normalized_extensions().is_empty() {
            errors.push(ValidationError {
                field: "source.allowed_extensions".into(),
                message: "must list at least one extension".into(),
            });
        }

        // --- storage ---
        if !VALID_BACKENDS.contains(&self.storage.backend.as_str()) {
            errors.push(ValidationError {
                field: "storage.backend".into(),
                message: format!(
                    "invalid backend '{}'; valid options: {}",
                    self.storage.backend,
                    VALID_BACKENDS.join(", ")
                ),
            });
        }
        if self.storage.backend == "s3" && self.storage.bucket.trim().is_empty() {
            errors.push(ValidationError {
                field: "storage.bucket".into(),
                message: "required for the s3 backend".into(),
            });
        }
        if !self.storage.key_format.contains("{archive}") {
            errors.push(ValidationError {
                field: "storage.key_format".into(),
                message: "must contain the {archive} placeholder".into(),
            });
        }

        // --- upload ---
        if self.upload.max_concurrent == 0 || self.upload.max_concurrent > MAX_CONCURRENCY {
            errors.push(ValidationError {
                field: "upload.max_concurrent".into(),
                message: format!("must be in range 1..={MAX_CONCURRENCY}"),
            });
        }
        if self.upload.max_attempts == 0 {
            errors.push(ValidationError {
                field: "upload.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- archive ---
        if self.archive.compression_level > 9 {
            errors.push(ValidationError {
                field: "archive.compression_level".into(),
                message: "must be in range 0..=9".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`].
///
/// ```
/// use photovault_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let cfg = ConfigBuilder::new()
///     .library_path(PathBuf::from("/srv/photos"))
///     .storage_backend("local")
///     .max_concurrent(2)
///     .build();
///
/// assert_eq!(cfg.upload.max_concurrent, 2);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- source ---

    pub fn library_path(mut self, path: PathBuf) -> Self {
        self.config.source.library_path = path;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.source.allowed_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.source.limit = limit;
        self
    }

    // --- storage ---

    pub fn storage_backend(mut self, backend: impl Into<String>) -> Self {
        self.config.storage.backend = backend.into();
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = bucket.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.region = region.into();
        self
    }

    pub fn local_root(mut self, root: PathBuf) -> Self {
        self.config.storage.local_root = root;
        self
    }

    pub fn storage_class(mut self, class: impl Into<String>) -> Self {
        self.config.storage.storage_class = Some(class.into());
        self
    }

    pub fn key_format(mut self, format: impl Into<String>) -> Self {
        self.config.storage.key_format = format.into();
        self
    }

    // --- upload ---

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.upload.max_concurrent = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.upload.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.upload.retry_backoff_ms = ms;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.config.upload.verify = verify;
        self
    }

    pub fn strict_verification(mut self, strict: bool) -> Self {
        self.config.upload.strict_verification = strict;
        self
    }

    // --- archive ---

    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.config.archive.work_dir = dir;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.archive.compression_level = level;
        self
    }

    // --- state ---

    pub fn ledger_file(mut self, path: PathBuf) -> Self {
        self.config.state.ledger_file = path;
        self
    }

    pub fn watermark_file(mut self, path: PathBuf) -> Self {
        self.config.state.watermark_file = path;
        self
    }

    // --- manifest ---

    pub fn manifest_enabled(mut self, enabled: bool) -> Self {
        self.config.manifest.enabled = enabled;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the config (no validation).
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the config or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
