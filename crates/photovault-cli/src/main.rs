//! PhotoVault CLI - Incremental photo library backups
//!
//! Provides commands for:
//! - Running a backup (or previewing one with `--dry-run`)
//! - Viewing the watermark and upload ledger
//! - Showing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod progress;

use commands::{backup::BackupCommand, config::ConfigCommand, status::StatusCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "photovault",
    version,
    about = "Incremental backups of a photo library to object storage"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Back up new photos and videos
    Backup(BackupCommand),
    /// Show the watermark and uploaded groups
    Status(StatusCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Global flags every command receives
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(photovault_core::config::Config::default_path);

    // Setup tracing; RUST_LOG wins, then -v, then the configured level
    let configured = commands::load_config(&config_path)
        .map(|config| config.logging)
        .unwrap_or_default();
    let filter = match cli.verbose {
        0 => configured.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if configured.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let ctx = Context {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
        config_path,
    };

    match cli.command {
        Commands::Backup(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_backup_flags() {
        let cli = Cli::try_parse_from([
            "photovault",
            "--json",
            "-vv",
            "backup",
            "--dry-run",
            "--limit",
            "25",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Backup(cmd) => {
                assert!(cmd.dry_run);
                assert_eq!(cmd.limit, Some(25));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_requires_subcommand() {
        assert!(Cli::try_parse_from(["photovault", "config"]).is_err());
        assert!(Cli::try_parse_from(["photovault", "config", "validate"]).is_ok());
    }
}
