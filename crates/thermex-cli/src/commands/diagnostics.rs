//! Diagnostics command implementation.

use anyhow::Result;
use serde::Serialize;
use thermex_core::{EntitySnapshot, HubDiagnostics};

use super::CommandContext;
use crate::util::{connect, write_output};

#[derive(Serialize)]
struct DiagnosticsReport {
    entry_id: String,
    hub: HubDiagnostics,
    entities: Vec<EntitySnapshot>,
}

/// Print a redacted diagnostics snapshot as JSON.
pub async fn cmd_diagnostics(ctx: &CommandContext<'_>) -> Result<()> {
    let integration = connect(ctx.config, ctx.quiet, ctx.opts.no_color).await?;
    let report = DiagnosticsReport {
        entry_id: integration.config().entry_id.clone(),
        hub: integration.diagnostics(),
        entities: integration.snapshots().await,
    };
    integration.unload().await;
    write_output(ctx.output, &ctx.opts.as_json(&report)?)
}
