//! Metadata manifest
//!
//! A pretty-printed JSON array describing every file selected by a run,
//! uploaded next to the archives so the library can be searched without
//! unpacking anything.

use chrono::{DateTime, Utc};
use photovault_core::{domain::MediaEntry, ports::IObjectStore};
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestRecord {
    pub path: String,
    pub taken: DateTime<Utc>,
    pub camera: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&MediaEntry> for ManifestRecord {
    fn from(entry: &MediaEntry) -> Self {
        Self {
            path: entry.path().display().to_string(),
            taken: entry.resolved_at(),
            camera: entry.camera().map(str::to_string),
            latitude: entry.location().map(|(lat, _)| lat),
            longitude: entry.location().map(|(_, long)| long),
        }
    }
}

pub fn render(entries: &[MediaEntry]) -> serde_json::Result<Vec<u8>> {
    let records: Vec<ManifestRecord> = entries.iter().map(ManifestRecord::from).collect();
    serde_json::to_vec_pretty(&records)
}

/// Uploads the manifest for `entries` under `remote_key`
#[instrument(skip(store, entries), fields(entries = entries.len()))]
pub async fn upload(
    store: &dyn IObjectStore,
    remote_key: &str,
    entries: &[MediaEntry],
    storage_class: Option<&str>,
) -> anyhow::Result<()> {
    let body = render(entries)?;
    store.put(remote_key, body, storage_class).await?;
    info!(remote_key, "Metadata manifest uploaded");
    Ok(())
}
