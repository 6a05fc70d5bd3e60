//! EXIF metadata reader (kamadak-exif)
//!
//! Capture time comes from `DateTimeOriginal`, falling back to `DateTime`.
//! When the matching `OffsetTime*` tag is present it is honoured; otherwise
//! the naive time is read on the local calendar, which is how cameras
//! record it. Files without EXIF resolve to empty metadata.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use photovault_core::{domain::CapturedMetadata, ports::IMetadataReader};
use tokio::task::spawn_blocking;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadataReader;

impl ExifMetadataReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl IMetadataReader for ExifMetadataReader {
    async fn resolve(&self, path: &Path) -> anyhow::Result<CapturedMetadata> {
        let path = path.to_path_buf();
        spawn_blocking(move || read_metadata(&path))
            .await
            .context("metadata task failed")?
    }
}

fn read_metadata(path: &Path) -> anyhow::Result<CapturedMetadata> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let exif = match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_) | exif::Error::NotSupported(_) | exif::Error::BlankValue(_)) => {
            return Ok(CapturedMetadata::default())
        }
        Err(err) => return Err(err).with_context(|| format!("invalid EXIF in {}", path.display())),
    };
    Ok(from_exif(&exif))
}

fn from_exif(exif: &Exif) -> CapturedMetadata {
    let captured_at = capture_time(exif, Tag::DateTimeOriginal, Tag::OffsetTimeOriginal)
        .or_else(|| capture_time(exif, Tag::DateTime, Tag::OffsetTime));

    let camera = ascii(exif, Tag::Model)
        .map(|model| model.trim().to_string())
        .filter(|model| !model.is_empty());

    let location = coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)
        .zip(coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef));

    CapturedMetadata {
        captured_at,
        camera,
        location,
    }
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

fn capture_time(exif: &Exif, tag: Tag, offset_tag: Tag) -> Option<DateTime<Utc>> {
    let raw = ascii(exif, tag)?;
    let mut parsed = exif::DateTime::from_ascii(raw.as_bytes()).ok()?;
    if let Some(offset) = ascii(exif, offset_tag) {
        let _ = parsed.parse_offset(offset.as_bytes());
    }

    let naive = NaiveDate::from_ymd_opt(
        i32::from(parsed.year),
        u32::from(parsed.month),
        u32::from(parsed.day),
    )?
    .and_hms_opt(
        u32::from(parsed.hour),
        u32::from(parsed.minute),
        u32::from(parsed.second),
    )?;

    match parsed.offset {
        Some(minutes) => FixedOffset::east_opt(i32::from(minutes) * 60)?
            .from_local_datetime(&naive)
            .single()
            .map(|at| at.with_timezone(&Utc)),
        None => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|at| at.with_timezone(&Utc)),
    }
}

/// Decimal degrees from a degrees/minutes/seconds rational triple
fn coordinate(exif: &Exif, tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        return None;
    };
    let dms: Vec<f64> = parts.iter().map(|r| r.to_f64()).collect();
    let hemisphere = ascii(exif, ref_tag).unwrap_or_default();
    dms_to_degrees(&dms, &hemisphere)
}

fn dms_to_degrees(dms: &[f64], hemisphere: &str) -> Option<f64> {
    let [degrees, minutes, seconds] = dms else {
        return None;
    };
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    if !value.is_finite() {
        return None;
    }
    match hemisphere.trim() {
        "S" | "W" => Some(-value),
        _ => Some(value),
    }
}
