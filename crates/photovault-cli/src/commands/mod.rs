pub mod backup;
pub mod config;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use photovault_core::config::Config;

/// Loads `path` when it exists, otherwise the defaults
///
/// A file that exists but fails to parse is an error, so a typo never
/// silently turns into a backup with default settings.
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.upload.max_concurrent, Config::default().upload.max_concurrent);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "upload: [not, a, map]\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "upload:\n  max_concurrent: 2\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.upload.max_concurrent, 2);
        assert_eq!(config.upload.max_attempts, Config::default().upload.max_attempts);
    }
}
