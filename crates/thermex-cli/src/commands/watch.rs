//! Watch command implementation.
//!
//! Streams every event of the dispatch bus until Ctrl+C or `--count` events.
//! The hub reconnects on its own, so lost connections show up as events
//! rather than ending the stream.

use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use thermex_core::HubEvent;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::CommandContext;
use crate::cli::OutputFormat;
use crate::format::{format_watch_json, format_watch_line};
use crate::util::{connect, write_output};

pub async fn cmd_watch(ctx: &CommandContext<'_>, format: OutputFormat, count: u32) -> Result<()> {
    let integration = connect(ctx.config, ctx.quiet, ctx.opts.no_color).await?;
    let mut rx = integration.hub().events().subscribe();
    if !ctx.quiet {
        eprintln!("Watching {} (Ctrl+C to stop)", integration.config().host);
    }

    let mut seen: u32 = 0;
    let result = loop {
        if count > 0 && seen >= count {
            break Ok(());
        }
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = rx.recv() => event,
        };
        match event {
            Ok(event) => {
                if let Err(e) = print_event(ctx, format, &event) {
                    break Err(e);
                }
                seen += 1;
            }
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
            Err(RecvError::Closed) => break Ok(()),
        }
    };

    integration.unload().await;
    if !ctx.quiet && count > 0 {
        eprintln!("Completed {} events.", seen);
    }
    result
}

fn print_event(ctx: &CommandContext<'_>, format: OutputFormat, event: &HubEvent) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    let line = match format {
        OutputFormat::Json => format_watch_json(event, now)?,
        OutputFormat::Text => format_watch_line(event, now, &ctx.opts),
    };
    match ctx.output {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(line.as_bytes())?;
            Ok(())
        }
        None => write_output(None, &line),
    }
}
