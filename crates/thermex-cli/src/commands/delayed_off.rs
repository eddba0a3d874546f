//! Delayed turn-off command implementation.
//!
//! The countdown lives in this process, so the command stays attached until
//! the fan is switched off. Ctrl+C cancels the countdown.

use anyhow::{Result, bail};
use thermex_core::HubEvent;
use tokio::sync::broadcast::error::RecvError;

use super::CommandContext;
use crate::style;
use crate::util::connect;

pub async fn cmd_delayed_off(ctx: &CommandContext<'_>, minutes: Option<u32>) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(minutes) = minutes {
        config.options.delayed_off_minutes = minutes;
    }
    let no_color = ctx.opts.no_color;

    let integration = connect(&config, ctx.quiet, no_color).await?;
    let entities = integration.entities();
    let mut rx = integration.hub().events().subscribe();

    if !entities.delayed_turn_off.press() {
        integration.unload().await;
        bail!("The fan is off; turn it on before scheduling a delayed turn-off");
    }
    if !ctx.quiet {
        let state = entities.fan.delayed_off().state();
        eprintln!(
            "{}",
            style::format_info(
                &format!(
                    "Fan turns off in {} min at {} (Ctrl+C to cancel)",
                    state.remaining_minutes,
                    state.scheduled_time.as_deref().unwrap_or("-")
                ),
                no_color
            )
        );
    }

    let fired = loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                entities.fan.cancel_delayed_off();
                break false;
            }
            event = rx.recv() => event,
        };
        match event {
            // Only this process cancels, so an inactive state means it fired.
            Ok(HubEvent::DelayedOff(state)) if !state.active => break true,
            Ok(HubEvent::DelayedOff(state)) => {
                if !ctx.quiet {
                    eprintln!("{} min left", state.remaining_minutes);
                }
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break false,
        }
    };

    integration.unload().await;
    if !ctx.quiet {
        let message = if fired {
            style::format_success("Fan switched off", no_color)
        } else {
            style::format_warning("Delayed turn-off cancelled", no_color)
        };
        eprintln!("{}", message);
    }
    Ok(())
}
