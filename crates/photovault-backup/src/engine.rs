//! Backup engine
//!
//! Ties the stages together for one run:
//!
//! 1. Capture the run start instant and load the watermark
//! 2. Load the ledger, scoped to the current watermark window
//! 3. Scan the library and drop duplicates, then apply the file limit
//! 4. Upload the metadata manifest (best effort)
//! 5. Group by month and fan the groups out through the controller
//! 6. Advance the watermark to the run start, only if nothing failed
//!
//! A run that finds nothing new has no side effects. A run cut short by
//! `source.limit` uploads what it selected but records nothing durable:
//! neither the ledger nor the watermark moves, so the next uncapped run
//! still sees every file the cap left out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use photovault_core::{
    config::{Config, StateConfig},
    domain::{
        ArchiveUnit, DomainError, ExclusionSummary, GroupKey, MediaEntry, UploadRecord, Watermark,
    },
    ports::{IMetadataReader, IObjectStore},
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    archive::ArchiveBuilder,
    controller::{ConcurrencyController, RunSummary},
    ledger::{LedgerState, ProgressLedger},
    manifest,
    partition::{deduplicate, group_by_month},
    pipeline::{UploadPipeline, UploadPolicy},
    progress::{ProgressEvent, ProgressSender, RunCounters},
    scanner::Scanner,
    watermark::WatermarkStore,
};

// ============================================================================
// Reports
// ============================================================================

/// Outcome of [`BackupEngine::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub previous_watermark: Watermark,
    pub eligible: usize,
    pub duplicates: usize,
    pub excluded: ExclusionSummary,
    pub summary: RunSummary,
    /// True when `source.limit` left eligible files out of this run
    pub truncated: bool,
    /// New watermark, when it was advanced
    pub watermark: Option<Watermark>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.summary.has_failures()
    }
}

/// One group of a dry run
#[derive(Debug, Clone, Serialize)]
pub struct PlannedGroup {
    pub key: GroupKey,
    pub files: usize,
    pub bytes: u64,
    pub remote_key: String,
    pub already_uploaded: bool,
}

/// Outcome of [`BackupEngine::plan`]
#[derive(Debug, Clone, Serialize)]
pub struct BackupPlan {
    pub watermark: Watermark,
    pub eligible: usize,
    pub duplicates: usize,
    pub excluded: ExclusionSummary,
    pub truncated: bool,
    pub groups: Vec<PlannedGroup>,
}

/// Outcome of [`BackupEngine::status`]
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub watermark: Watermark,
    pub ledger_window: Watermark,
    /// False when the ledger belongs to an earlier watermark and will be
    /// ignored by the next run
    pub ledger_current: bool,
    pub records: Vec<UploadRecord>,
}

/// Files selected for a run after dedup and limit
struct Selection {
    entries: Vec<MediaEntry>,
    duplicates: usize,
    excluded: ExclusionSummary,
    truncated: bool,
}

// ============================================================================
// BackupEngine
// ============================================================================

pub struct BackupEngine {
    config: Config,
    store: Arc<dyn IObjectStore>,
    reader: Arc<dyn IMetadataReader>,
    progress: ProgressSender,
}

impl BackupEngine {
    pub fn new(
        config: Config,
        store: Arc<dyn IObjectStore>,
        reader: Arc<dyn IMetadataReader>,
    ) -> Self {
        Self {
            config,
            store,
            reader,
            progress: ProgressSender::disabled(),
        }
    }

    /// Publishes progress events to `progress`
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Performs one backup run
    #[instrument(skip(self), fields(store = %self.store.describe()))]
    pub async fn run(&self) -> anyhow::Result<RunReport> {
        self.check_key_format()?;
        let started_at = Utc::now();

        let watermarks = WatermarkStore::new(&self.config.state.watermark_file);
        let previous = watermarks.load().await;
        let ledger_state = LedgerState::load(&self.config.state.ledger_file)
            .await?
            .scoped_to(previous);
        info!(watermark = %previous, recorded = ledger_state.len(), "Starting backup");

        let selection = self.select(previous).await?;
        let mut report = RunReport {
            started_at,
            previous_watermark: previous,
            eligible: selection.entries.len(),
            duplicates: selection.duplicates,
            excluded: selection.excluded,
            summary: RunSummary::default(),
            truncated: selection.truncated,
            watermark: None,
        };

        if selection.entries.is_empty() {
            info!("No new files to upload");
            self.progress.emit(ProgressEvent::RunFinished {
                completed: 0,
                failed: 0,
            });
            return Ok(report);
        }

        let total_files = selection.entries.len();
        let groups = group_by_month(selection.entries.clone());
        let pending = groups.keys().any(|key| !ledger_state.contains(*key));

        if self.config.manifest.enabled && pending {
            if let Err(err) = manifest::upload(
                self.store.as_ref(),
                &self.config.manifest.remote_key,
                &selection.entries,
                self.config.storage.storage_class.as_deref(),
            )
            .await
            {
                warn!(error = %format!("{err:#}"), "Failed to upload metadata manifest");
            }
        }

        self.progress.emit(ProgressEvent::RunStarted {
            groups: groups.len(),
            files: total_files,
        });

        let pipeline = UploadPipeline::new(
            ArchiveBuilder::new(
                &self.config.archive.work_dir,
                self.config.archive.compression_level,
            ),
            Arc::clone(&self.store),
            Arc::new(if selection.truncated {
                ProgressLedger::in_memory(ledger_state)
            } else {
                ProgressLedger::new(&self.config.state.ledger_file, ledger_state)
            }),
            Arc::new(RunCounters::new(total_files as u64)),
            self.config.storage.clone(),
            UploadPolicy::from_config(&self.config.upload, &self.config.storage),
        )
        .with_progress(self.progress.clone());

        let controller = ConcurrencyController::new(self.config.upload.max_concurrent);
        let summary = controller.run_all(groups.into_values(), pipeline).await;
        report.summary = summary;

        if summary.has_failures() {
            warn!(
                failed_archives = summary.failed_archives,
                failed_uploads = summary.failed_uploads,
                failed_verifications = summary.failed_verifications,
                "Run finished with failures; watermark not advanced"
            );
        } else if selection.truncated {
            info!("Run was limited; watermark not advanced");
        } else {
            let next = Watermark::at(started_at);
            match watermarks.save(next).await {
                Ok(()) => report.watermark = Some(next),
                Err(err) => warn!(error = %err, "Failed to save watermark"),
            }
        }

        self.progress.emit(ProgressEvent::RunFinished {
            completed: summary.completed,
            failed: summary.failed(),
        });
        Ok(report)
    }

    /// Scans and partitions without building, uploading or persisting anything
    #[instrument(skip(self))]
    pub async fn plan(&self) -> anyhow::Result<BackupPlan> {
        self.check_key_format()?;
        let watermark = WatermarkStore::new(&self.config.state.watermark_file)
            .load()
            .await;
        let ledger = LedgerState::load(&self.config.state.ledger_file)
            .await?
            .scoped_to(watermark);

        let selection = self.select(watermark).await?;
        let eligible = selection.entries.len();
        let now = Utc::now();
        let groups = group_by_month(selection.entries)
            .into_values()
            .map(|group| PlannedGroup {
                key: group.key(),
                files: group.len(),
                bytes: group.total_bytes(),
                remote_key: self
                    .config
                    .storage
                    .remote_key(group.key(), &ArchiveUnit::generate_name(group.key(), now)),
                already_uploaded: ledger.contains(group.key()),
            })
            .collect();

        Ok(BackupPlan {
            watermark,
            eligible,
            duplicates: selection.duplicates,
            excluded: selection.excluded,
            truncated: selection.truncated,
            groups,
        })
    }

    /// Reads the watermark and ledger without scanning
    pub async fn status(&self) -> anyhow::Result<StatusReport> {
        Self::read_status(&self.config.state).await
    }

    /// Same as [`BackupEngine::status`], without needing a store
    pub async fn read_status(state: &StateConfig) -> anyhow::Result<StatusReport> {
        let watermark = WatermarkStore::new(&state.watermark_file).load().await;
        let ledger = LedgerState::load(&state.ledger_file).await?;
        Ok(StatusReport {
            watermark,
            ledger_window: ledger.window(),
            ledger_current: ledger.window() == watermark,
            records: ledger.records().cloned().collect(),
        })
    }

    async fn select(&self, watermark: Watermark) -> anyhow::Result<Selection> {
        let scanner = Scanner::new(Arc::clone(&self.reader), &self.config.source);
        let scan = scanner
            .scan(&self.config.source.library_path, watermark)
            .await?;
        for (extension, count) in scan.excluded.iter() {
            let extension = if extension.is_empty() { "(none)" } else { extension };
            info!(extension, count, "Excluded files");
        }

        let deduplicated = deduplicate(scan.eligible);
        let mut entries = deduplicated.kept;
        let limit = self.config.source.limit;
        let truncated = limit > 0 && entries.len() > limit;
        if truncated {
            info!(limit, found = entries.len(), "Limiting files for this run");
            entries.truncate(limit);
        }

        Ok(Selection {
            entries,
            duplicates: deduplicated.duplicates.len(),
            excluded: scan.excluded,
            truncated,
        })
    }

    fn check_key_format(&self) -> Result<(), DomainError> {
        let format = &self.config.storage.key_format;
        if format.contains("{archive}") {
            Ok(())
        } else {
            Err(DomainError::InvalidKeyFormat(format.clone()))
        }
    }
}
