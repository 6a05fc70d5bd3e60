//! Status command - Show the watermark and the groups uploaded under it

use anyhow::{Context as _, Result};
use clap::Args;
use photovault_backup::BackupEngine;

use crate::{commands::load_config, output::get_formatter, Context};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format, ctx.quiet);
        let config = load_config(&ctx.config_path)?;

        let status = BackupEngine::read_status(&config.state).await?;

        if ctx.format.is_json() {
            let json = serde_json::to_value(&status).context("Failed to serialize status")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success("PhotoVault status");
        formatter.field("Watermark", &status.watermark.to_string());
        formatter.field("Ledger window", &status.ledger_window.to_string());
        if !status.ledger_current {
            formatter.warn("Ledger belongs to an earlier watermark; the next run starts fresh");
        }
        formatter.field("Uploaded groups", &status.records.len().to_string());
        for record in &status.records {
            formatter.info(&format!(
                "  {}  {}  ({})",
                record.group_key,
                record.remote_key,
                record.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }

        Ok(())
    }
}
