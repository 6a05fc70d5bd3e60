//! Concurrency controller
//!
//! Spawns one worker per group and bounds how many execute the pipeline at
//! once with a semaphore. [`ConcurrencyController::run_all`] returns only
//! after every worker has reached a terminal state.

use std::sync::Arc;

use photovault_core::domain::Group;
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info, instrument};

use crate::pipeline::{GroupOutcome, UploadPipeline};

/// Tallies of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub groups: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed_archives: usize,
    pub failed_uploads: usize,
    pub failed_verifications: usize,
    pub ledger_failures: usize,
    /// Workers that panicked before reaching a terminal state
    pub aborted: usize,
    pub files_archived: u64,
}

impl RunSummary {
    /// Groups that did not complete
    pub fn failed(&self) -> usize {
        self.failed_archives + self.failed_uploads + self.failed_verifications + self.aborted
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Admission gate over upload pipelines
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    max_concurrent: usize,
}

impl ConcurrencyController {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Processes every group and waits for all of them
    #[instrument(skip(self, groups, pipeline), fields(max_concurrent = self.max_concurrent))]
    pub async fn run_all<I>(&self, groups: I, pipeline: UploadPipeline) -> RunSummary
    where
        I: IntoIterator<Item = Group>,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();

        for group in groups {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = pipeline.clone();
            workers.spawn(async move {
                // The semaphore is never closed, so acquisition only waits
                let _permit = semaphore.acquire_owned().await.ok();
                pipeline.run(group).await
            });
        }

        let mut summary = RunSummary {
            groups: workers.len(),
            ..RunSummary::default()
        };

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(GroupOutcome::Completed) => summary.completed += 1,
                Ok(GroupOutcome::Skipped) => summary.skipped += 1,
                // Failure kinds are tallied by the shared counters below
                Ok(GroupOutcome::Failed(_)) => {}
                Err(err) => {
                    error!(error = %err, "Group worker aborted");
                    summary.aborted += 1;
                }
            }
        }

        let failures = pipeline.counters().failures();
        summary.failed_archives = failures.archives;
        summary.failed_uploads = failures.uploads;
        summary.failed_verifications = failures.verifications;
        summary.ledger_failures = failures.ledger_saves;
        summary.files_archived = pipeline.counters().files_archived();

        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed(),
            "All groups finished"
        );
        summary
    }
}
