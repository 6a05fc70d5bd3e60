//! Config command - View and validate PhotoVault configuration

use anyhow::{Context as _, Result};
use clap::Subcommand;
use tracing::info;

use crate::{commands::load_config, output::get_formatter, Context};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format, ctx.quiet);
        let config = load_config(&ctx.config_path)?;

        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            let origin = if ctx.config_path.exists() {
                ctx.config_path.display().to_string()
            } else {
                format!("defaults, {} not found", ctx.config_path.display())
            };
            formatter.success(&format!("Configuration ({origin})"));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_validate(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format, ctx.quiet);
        let config = load_config(&ctx.config_path)?;
        let errors = config.validate();

        if ctx.format.is_json() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": ctx.config_path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success(&format!(
                "Configuration is valid ({})",
                ctx.config_path.display()
            ));
        } else {
            for error in &errors {
                formatter.error(&error.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{} configuration error(s)", errors.len())
        }
    }
}
