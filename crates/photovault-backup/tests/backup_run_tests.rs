//! End-to-end tests for BackupEngine against in-memory collaborators

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use photovault_backup::{
    ledger::LedgerState,
    progress::{ProgressEvent, ProgressSender},
    watermark::WatermarkStore,
    BackupEngine,
};
use photovault_core::{
    config::{Config, ConfigBuilder},
    domain::{CapturedMetadata, GroupKey, UploadRecord, Watermark},
    ports::{IMetadataReader, IObjectStore},
};
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};

// ============================================================================
// Test doubles
// ============================================================================

/// Object store kept in memory; keys containing `fail_matching` can be made
/// to fail a number of times
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicU32,
    fail_matching: Option<String>,
    failures_left: AtomicU32,
}

impl MemoryStore {
    fn failing(pattern: &str, times: u32) -> Self {
        Self {
            fail_matching: Some(pattern.to_string()),
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    async fn archive_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .await
            .keys()
            .filter(|k| k.ends_with(".tar.gz"))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl IObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>, _class: Option<&str>) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(pattern) = &self.fail_matching {
            if key.contains(pattern.as_str())
                && self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                anyhow::bail!("simulated outage for {key}");
            }
        }
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self.object(key)
            .await
            .ok_or_else(|| anyhow::anyhow!("no such key: {key}"))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Capture times keyed by base filename
#[derive(Default)]
struct CaptureTimes(HashMap<String, DateTime<Utc>>);

#[async_trait]
impl IMetadataReader for CaptureTimes {
    async fn resolve(&self, path: &Path) -> anyhow::Result<CapturedMetadata> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(CapturedMetadata {
            captured_at: self.0.get(&name).copied(),
            camera: Some("TestCam".to_string()),
            location: None,
        })
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Library {
    dir: TempDir,
    times: HashMap<String, DateTime<Utc>>,
}

impl Library {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            times: HashMap::new(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    fn state(&self, name: &str) -> PathBuf {
        self.dir.path().join("state").join(name)
    }

    fn stage(&self) -> PathBuf {
        self.dir.path().join("stage")
    }

    /// Adds `rel` captured at noon UTC on the given day
    fn photo(&mut self, rel: &str, year: i32, month: u32, day: u32) -> &mut Self {
        let at = Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap();
        self.file(rel);
        let name = Path::new(rel).file_name().unwrap().to_string_lossy().into_owned();
        self.times.insert(name, at);
        self
    }

    fn file(&mut self, rel: &str) -> &mut Self {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("contents of {rel}")).unwrap();
        self
    }

    fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new()
            .library_path(self.root())
            .storage_backend("local")
            .work_dir(self.stage())
            .ledger_file(self.state("ledger.json"))
            .watermark_file(self.state("last_upload.txt"))
            .retry_backoff_ms(1)
    }

    fn engine(&self, config: Config, store: Arc<MemoryStore>) -> BackupEngine {
        BackupEngine::new(config, store, Arc::new(CaptureTimes(self.times.clone())))
    }

    fn staged(&self) -> Vec<String> {
        std::fs::read_dir(self.stage())
            .map(|d| {
                d.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn ledger(&self) -> LedgerState {
        LedgerState::load(&self.state("ledger.json")).await.unwrap()
    }

    async fn watermark(&self) -> Watermark {
        WatermarkStore::new(self.state("last_upload.txt")).load().await
    }
}

fn key(s: &str) -> GroupKey {
    s.parse().unwrap()
}

fn march_and_april() -> Library {
    let mut lib = Library::new();
    lib.photo("2024/03/a.jpg", 2024, 3, 10)
        .photo("2024/03/b.jpg", 2024, 3, 11)
        .photo("2024/03/c.heic", 2024, 3, 12)
        .photo("2024/04/d.jpg", 2024, 4, 14)
        .photo("2024/04/e.mov", 2024, 4, 15);
    lib
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn end_to_end_two_months() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::default());
    let config = lib.config().max_concurrent(2).build();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = lib
        .engine(config, Arc::clone(&store))
        .with_progress(ProgressSender::new(tx));

    let before = Utc::now();
    let report = engine.run().await.unwrap();
    drop(engine);

    assert!(report.is_success());
    assert_eq!(report.eligible, 5);
    assert_eq!(report.summary.groups, 2);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.files_archived, 5);

    let archives = store.archive_keys().await;
    assert_eq!(archives.len(), 2);
    assert!(archives[0].starts_with("2024/2024-03_"));
    assert!(archives[1].starts_with("2024/2024-04_"));
    assert!(store.object("photo_metadata.json").await.is_some());

    let ledger = lib.ledger().await;
    assert!(ledger.contains(key("2024-03")));
    assert!(ledger.contains(key("2024-04")));
    assert!(ledger.records().all(|r| r.sha256.is_some()));

    assert!(lib.staged().is_empty(), "local archives should be deleted");

    let watermark = lib.watermark().await.instant().unwrap();
    assert!(watermark >= before);
    assert_eq!(report.watermark, Some(Watermark::at(report.started_at)));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::RunStarted { groups: 2, files: 5 })
    );
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::RunFinished {
            completed: 2,
            failed: 0
        })
    );
    let archived: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::FileArchived { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect();
    let mut sorted = archived.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn recorded_groups_are_not_rebuilt() {
    let lib = march_and_april();
    let mut ledger = LedgerState::for_window(Watermark::zero());
    for group in ["2024-03", "2024-04"] {
        ledger.record(UploadRecord {
            group_key: key(group),
            remote_key: format!("2024/{group}_old.tar.gz"),
            archive_name: format!("{group}_old.tar.gz"),
            completed_at: Utc::now(),
            sha256: None,
        });
    }
    ledger.save(&lib.state("ledger.json")).await.unwrap();

    let store = Arc::new(MemoryStore::default());
    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.completed, 0);
    assert_eq!(report.summary.files_archived, 0);
    assert_eq!(store.puts(), 0);
    assert!(lib.staged().is_empty());
}

#[tokio::test]
async fn second_run_over_unchanged_tree_uploads_nothing() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::default());

    lib.engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();
    let puts_after_first = store.puts();

    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.eligible, 0);
    assert_eq!(report.summary.groups, 0);
    assert_eq!(store.puts(), puts_after_first);
}

#[tokio::test]
async fn failed_group_is_resumed_on_next_run() {
    let lib = march_and_april();

    // First run: every April upload attempt fails
    let flaky = Arc::new(MemoryStore::failing("2024-04_", 3));
    let first = lib
        .engine(lib.config().build(), Arc::clone(&flaky))
        .run()
        .await
        .unwrap();

    assert_eq!(first.summary.completed, 1);
    assert_eq!(first.summary.failed_uploads, 1);
    assert!(first.watermark.is_none());
    assert!(lib.watermark().await.is_zero());

    let ledger = lib.ledger().await;
    assert!(ledger.contains(key("2024-03")));
    assert!(!ledger.contains(key("2024-04")));

    let staged = lib.staged();
    assert_eq!(staged.len(), 1, "failed archive is kept");
    assert!(staged[0].starts_with("2024-04_"));

    // Second run: March is skipped, April is uploaded
    let healthy = Arc::new(MemoryStore::default());
    let second = lib
        .engine(lib.config().build(), Arc::clone(&healthy))
        .run()
        .await
        .unwrap();

    assert_eq!(second.summary.skipped, 1);
    assert_eq!(second.summary.completed, 1);
    let archives = healthy.archive_keys().await;
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("2024/2024-04_"));
    assert!(lib.ledger().await.contains(key("2024-04")));
    assert!(!lib.watermark().await.is_zero());
}

#[tokio::test]
async fn upload_succeeding_on_third_attempt_is_not_a_failure() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::failing("2024-03_", 2));

    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.failed_uploads, 0);
    assert_eq!(store.archive_keys().await.len(), 2);
}

#[tokio::test]
async fn exclusions_are_counted_and_not_uploaded() {
    let mut lib = Library::new();
    lib.photo("a.jpg", 2024, 3, 10)
        .photo("b.PNG", 2024, 3, 11)
        .file("notes.txt")
        .file("sub/clip.avi")
        .file("sub/more.TXT");

    let store = Arc::new(MemoryStore::default());
    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.eligible, 2);
    assert_eq!(report.excluded.total(), 3);
    assert_eq!(report.excluded.count(".txt"), 2);
    assert_eq!(report.excluded.count(".avi"), 1);
}

#[tokio::test]
async fn duplicate_files_are_archived_once() {
    let mut lib = Library::new();
    lib.photo("phone/IMG_0001.jpg", 2024, 3, 10)
        .file("export/IMG_0001.jpg")
        .photo("phone/IMG_0002.jpg", 2024, 3, 10);

    let store = Arc::new(MemoryStore::default());
    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.eligible, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.summary.files_archived, 2);
}

#[tokio::test]
async fn only_files_after_the_watermark_are_selected() {
    let mut lib = Library::new();
    lib.photo("old.jpg", 2024, 3, 1)
        .photo("new.jpg", 2024, 3, 20);
    let mark = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    WatermarkStore::new(lib.state("last_upload.txt"))
        .save(Watermark::at(mark))
        .await
        .unwrap();

    let store = Arc::new(MemoryStore::default());
    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.eligible, 1);
    assert_eq!(report.previous_watermark, Watermark::at(mark));
}

#[tokio::test]
async fn empty_library_is_a_no_op() {
    let lib = Library::new();
    std::fs::create_dir_all(lib.root()).unwrap();
    let store = Arc::new(MemoryStore::default());

    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.eligible, 0);
    assert_eq!(store.puts(), 0);
    assert!(!lib.state("ledger.json").exists());
    assert!(!lib.state("last_upload.txt").exists());
}

#[tokio::test]
async fn limit_caps_selected_files() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::default());
    let report = lib
        .engine(lib.config().limit(2).build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.eligible, 2);
    assert_eq!(report.summary.files_archived, 2);
    assert!(report.truncated);
    assert!(report.watermark.is_none());
    assert!(lib.watermark().await.is_zero());
    assert!(!lib.state("ledger.json").exists());

    // The capped run cut March short, so the uncapped run rebuilds it whole
    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert!(!report.truncated);
    assert_eq!(report.eligible, 5);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.files_archived, 5);
    assert!(!lib.watermark().await.is_zero());
    assert_eq!(lib.ledger().await.len(), 2);
}

#[tokio::test]
async fn dry_run_has_no_side_effects() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::default());
    let plan = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .plan()
        .await
        .unwrap();

    assert_eq!(plan.eligible, 5);
    let shape: Vec<(String, usize)> = plan
        .groups
        .iter()
        .map(|g| (g.key.to_string(), g.files))
        .collect();
    assert_eq!(
        shape,
        vec![("2024-03".to_string(), 3), ("2024-04".to_string(), 2)]
    );
    assert!(plan.groups.iter().all(|g| !g.already_uploaded));
    assert!(plan.groups[0].remote_key.starts_with("2024/2024-03_"));

    assert_eq!(store.puts(), 0);
    assert!(lib.staged().is_empty());
    assert!(!lib.state("ledger.json").exists());
    assert!(!lib.state("last_upload.txt").exists());
}

#[tokio::test]
async fn status_reports_watermark_and_records() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::default());
    let engine = lib.engine(lib.config().build(), Arc::clone(&store));

    let before = engine.status().await.unwrap();
    assert!(before.watermark.is_zero());
    assert!(before.records.is_empty());

    engine.run().await.unwrap();

    let after = engine.status().await.unwrap();
    assert!(!after.watermark.is_zero());
    assert_eq!(after.records.len(), 2);
    assert!(!after.ledger_current, "records belong to the previous window");
}

#[tokio::test]
async fn key_format_without_archive_is_rejected() {
    let lib = march_and_april();
    let store = Arc::new(MemoryStore::default());
    let config = lib.config().key_format("{year}/backup.tar.gz").build();

    assert!(lib.engine(config, Arc::clone(&store)).run().await.is_err());
    assert_eq!(store.puts(), 0);
}

#[tokio::test]
async fn missing_library_is_a_no_op() {
    let lib = Library::new();
    let store = Arc::new(MemoryStore::default());

    let report = lib
        .engine(lib.config().build(), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    assert_eq!(report.eligible, 0);
    assert!(report.watermark.is_none());
    assert_eq!(store.puts(), 0);
    assert!(!lib.state("last_upload.txt").exists());
}
