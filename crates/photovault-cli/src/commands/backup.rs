//! Backup command - Archive and upload new photos
//!
//! Provides the `photovault backup` CLI command which:
//! 1. Scans the library for files newer than the watermark
//! 2. Packs each month into an archive and uploads it
//! 3. Prints a summary, or the plan when `--dry-run` is given

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use photovault_backup::{progress::ProgressSender, BackupEngine, BackupPlan, RunReport};
use photovault_core::domain::ExclusionSummary;
use photovault_storage::{object_store_from_config, ExifMetadataReader};
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    commands::load_config,
    output::{get_formatter, human_bytes, OutputFormatter},
    progress::spawn_renderer,
    Context,
};

#[derive(Debug, Args)]
pub struct BackupCommand {
    /// Show what would be uploaded without archiving or uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Upload at most this many files (overrides `source.limit`)
    #[arg(long)]
    pub limit: Option<usize>,
}

impl BackupCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format, ctx.quiet);

        let mut config = load_config(&ctx.config_path)?;
        if let Some(limit) = self.limit {
            config.source.limit = limit;
        }

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            bail!("Invalid configuration in {}", ctx.config_path.display());
        }

        let store = object_store_from_config(&config.storage)?;
        info!(
            library = %config.source.library_path.display(),
            store = %store.describe(),
            dry_run = self.dry_run,
            "Backup requested"
        );
        let reader = Arc::new(ExifMetadataReader::new());

        if self.dry_run {
            let plan = BackupEngine::new(config, store, reader).plan().await?;
            return print_plan(&plan, ctx, formatter.as_ref());
        }

        // Progress goes to the terminal only in human mode
        let (engine, renderer) = if ctx.format.is_json() || ctx.quiet {
            (BackupEngine::new(config, store, reader), None)
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            let engine =
                BackupEngine::new(config, store, reader).with_progress(ProgressSender::new(tx));
            (engine, Some(spawn_renderer(rx)))
        };

        let result = engine.run().await;
        // Dropping the engine closes the channel so the renderer can drain
        drop(engine);
        if let Some(renderer) = renderer {
            renderer.await.context("Progress renderer failed")?;
        }

        // Group failures are reported, not turned into an error exit
        let report = result?;
        print_report(&report, ctx, formatter.as_ref())
    }
}

fn exclusions_line(excluded: &ExclusionSummary) -> String {
    if excluded.is_empty() {
        return "none".to_string();
    }
    excluded
        .iter()
        .map(|(extension, count)| {
            let extension = if extension.is_empty() { "(none)" } else { extension };
            format!("{extension} x{count}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_report(report: &RunReport, ctx: &Context, formatter: &dyn OutputFormatter) -> Result<()> {
    if ctx.format.is_json() {
        let json = serde_json::to_value(report).context("Failed to serialize run report")?;
        formatter.print_json(&json);
        return Ok(());
    }

    let summary = &report.summary;
    if summary.groups == 0 {
        formatter.success("Nothing new to back up");
    } else if report.is_success() {
        formatter.success("Backup complete");
    } else {
        formatter.warn(&format!(
            "{} of {} groups failed; the watermark was not advanced",
            summary.failed(),
            summary.groups
        ));
    }
    if report.truncated {
        formatter.warn("File limit reached; the watermark was not advanced");
    }

    formatter.field("Since", &report.previous_watermark.to_string());
    formatter.field("Eligible files", &report.eligible.to_string());
    formatter.field("Duplicates", &report.duplicates.to_string());
    formatter.field("Excluded", &exclusions_line(&report.excluded));
    if summary.groups > 0 {
        formatter.field(
            "Groups",
            &format!(
                "{} total, {} uploaded, {} already done",
                summary.groups, summary.completed, summary.skipped
            ),
        );
        formatter.field("Files archived", &summary.files_archived.to_string());
    }
    if summary.has_failures() {
        formatter.field(
            "Failures",
            &format!(
                "{} archive, {} upload, {} verification, {} aborted",
                summary.failed_archives,
                summary.failed_uploads,
                summary.failed_verifications,
                summary.aborted
            ),
        );
    }
    if summary.ledger_failures > 0 {
        formatter.warn(&format!(
            "{} ledger save(s) failed; a retried run may upload those groups again",
            summary.ledger_failures
        ));
    }
    if let Some(watermark) = report.watermark {
        formatter.field("New watermark", &watermark.to_string());
    }
    Ok(())
}

fn print_plan(plan: &BackupPlan, ctx: &Context, formatter: &dyn OutputFormatter) -> Result<()> {
    if ctx.format.is_json() {
        let json = serde_json::to_value(plan).context("Failed to serialize backup plan")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success("Dry run, nothing will be uploaded");
    if plan.truncated {
        formatter.warn("File limit reached; later runs will pick up the rest");
    }
    formatter.field("Since", &plan.watermark.to_string());
    formatter.field("Eligible files", &plan.eligible.to_string());
    formatter.field("Duplicates", &plan.duplicates.to_string());
    formatter.field("Excluded", &exclusions_line(&plan.excluded));
    for group in &plan.groups {
        let note = if group.already_uploaded {
            " (already uploaded)"
        } else {
            ""
        };
        formatter.info(&format!(
            "  {}  {:>5} files  {:>10}  -> {}{note}",
            group.key,
            group.files,
            human_bytes(group.bytes),
            group.remote_key
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;
    use photovault_backup::controller::RunSummary;
    use photovault_core::domain::Watermark;

    use super::*;
    use crate::output::OutputFormat;

    fn context(format: OutputFormat) -> Context {
        Context {
            format,
            quiet: true,
            config_path: PathBuf::from("config.yaml"),
        }
    }

    #[test]
    fn failed_groups_still_finish_cleanly() {
        let report = RunReport {
            started_at: Utc::now(),
            previous_watermark: Watermark::zero(),
            eligible: 5,
            duplicates: 0,
            excluded: ExclusionSummary::new(),
            summary: RunSummary {
                groups: 2,
                completed: 1,
                failed_uploads: 1,
                files_archived: 5,
                ..RunSummary::default()
            },
            truncated: false,
            watermark: None,
        };
        assert!(!report.is_success());

        for format in [OutputFormat::Human, OutputFormat::Json] {
            let ctx = context(format);
            let formatter = get_formatter(ctx.format, ctx.quiet);
            assert!(print_report(&report, &ctx, formatter.as_ref()).is_ok());
        }
    }

    #[test]
    fn exclusions_are_listed_per_extension() {
        let mut excluded = ExclusionSummary::new();
        assert_eq!(exclusions_line(&excluded), "none");

        excluded.record(".txt");
        excluded.record(".txt");
        excluded.record("");
        let line = exclusions_line(&excluded);
        assert!(line.contains(".txt x2"));
        assert!(line.contains("(none) x1"));
    }
}
