//! Thermex command-line interface.

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigAction};
use crate::commands::CommandContext;
use crate::config::{Config, default_config_path};
use crate::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "thermex", &mut io::stdout());
        return Ok(());
    }

    // Logs go to stderr so JSON on stdout stays parseable
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let opts = FormatOptions::new(cli.no_color, cli.compact);

    if let Commands::Config { action } = &cli.command {
        // `path` and `init` must work without a readable config file
        let mut config = match action {
            ConfigAction::Path | ConfigAction::Init { .. } => Config::default(),
            _ => Config::load(&config_path)?,
        };
        config.apply_overrides(&cli.hood);
        return commands::cmd_config(action.clone(), &config_path, &config, cli.json, &opts);
    }

    let mut config = Config::load(&config_path)?;
    config.apply_overrides(&cli.hood);
    if matches!(cli.command, Commands::Deco { .. }) {
        config.options.enable_decolight = true;
    }
    tracing::debug!("Using config {}", config_path.display());

    let ctx = CommandContext {
        config: &config,
        output: cli.output.as_ref(),
        opts,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Status { format, entities } => {
            commands::cmd_status(&ctx, cli.format(*format), *entities).await
        }
        Commands::Fan { action } => commands::cmd_fan(&ctx, action.clone()).await,
        Commands::Light { action } => commands::cmd_light(&ctx, action.clone()).await,
        Commands::Deco { action } => commands::cmd_deco(&ctx, action.clone()).await,
        Commands::Watch { format, count } => {
            commands::cmd_watch(&ctx, cli.format(*format), *count).await
        }
        Commands::Runtime { action } => {
            let action = match action {
                cli::RuntimeAction::Show { format } => cli::RuntimeAction::Show {
                    format: cli.format(*format),
                },
                other => other.clone(),
            };
            commands::cmd_runtime(&ctx, action).await
        }
        Commands::DelayedOff { minutes } => commands::cmd_delayed_off(&ctx, *minutes).await,
        Commands::Diagnostics => commands::cmd_diagnostics(&ctx).await,
        Commands::Config { .. } | Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }
}
