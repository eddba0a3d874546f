//! Runtime counter commands.
//!
//! `show` reads the persisted state without contacting the hood. `reset`
//! connects so a running session restarts from zero.

use anyhow::{Context, Result};
use thermex_core::RuntimeManager;

use super::CommandContext;
use crate::cli::{OutputFormat, RuntimeAction};
use crate::format::{RuntimeReport, format_runtime_text};
use crate::style;
use crate::util::{connect, open_store, write_output};

pub async fn cmd_runtime(ctx: &CommandContext<'_>, action: RuntimeAction) -> Result<()> {
    match action {
        RuntimeAction::Show { format } => show(ctx, format),
        RuntimeAction::Reset => reset(ctx).await,
    }
}

fn show(ctx: &CommandContext<'_>, format: OutputFormat) -> Result<()> {
    let store = open_store(ctx.config)?;
    let mut runtime = RuntimeManager::new(store, &ctx.config.hood.entry_id);
    runtime.load().context("Failed to load runtime state")?;

    let report = RuntimeReport::from_manager(&runtime, &ctx.config.options.thresholds());
    let content = match format {
        OutputFormat::Json => ctx.opts.as_json(&report)?,
        OutputFormat::Text => format_runtime_text(&report, &ctx.opts),
    };
    write_output(ctx.output, &content)
}

async fn reset(ctx: &CommandContext<'_>) -> Result<()> {
    let integration = connect(ctx.config, ctx.quiet, ctx.opts.no_color).await?;
    let result = integration.entities().reset_runtime.press().await;
    integration.unload().await;
    result.context("Failed to reset runtime")?;

    if !ctx.quiet {
        eprintln!(
            "{}",
            style::format_success("Runtime counter reset", ctx.opts.no_color)
        );
    }
    Ok(())
}
