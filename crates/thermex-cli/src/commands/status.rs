//! Status command implementation.

use anyhow::Result;

use super::CommandContext;
use crate::cli::OutputFormat;
use crate::format::{StatusReport, format_entities_text, format_status_text};
use crate::util::{connect, write_output};

pub async fn cmd_status(
    ctx: &CommandContext<'_>,
    format: OutputFormat,
    entities: bool,
) -> Result<()> {
    let integration = connect(ctx.config, ctx.quiet, ctx.opts.no_color).await?;

    let content = if entities {
        let snapshots = integration.snapshots().await;
        match format {
            OutputFormat::Json => ctx.opts.as_json(&snapshots)?,
            OutputFormat::Text => format_entities_text(&snapshots, &ctx.opts),
        }
    } else {
        let report = StatusReport::collect(&integration).await;
        match format {
            OutputFormat::Json => ctx.opts.as_json(&report)?,
            OutputFormat::Text => format_status_text(&report, &ctx.opts),
        }
    };

    integration.unload().await;
    write_output(ctx.output, &content)
}
