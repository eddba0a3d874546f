//! Fan and light control commands.

use anyhow::{Context, Result, anyhow};
use thermex_core::{Integration, Preset};

use super::CommandContext;
use crate::cli::{DecoAction, FanAction, LightAction};
use crate::style;
use crate::util::connect;

/// Run `action` against a freshly set-up entry, always unloading it.
async fn with_entry<F, Fut>(ctx: &CommandContext<'_>, action: F) -> Result<String>
where
    F: FnOnce(&Integration) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let integration = connect(ctx.config, ctx.quiet, ctx.opts.no_color).await?;
    let result = action(&integration).await;
    integration.unload().await;
    result
}

fn report(ctx: &CommandContext<'_>, message: &str) {
    if !ctx.quiet {
        eprintln!("{}", style::format_success(message, ctx.opts.no_color));
    }
}

pub async fn cmd_fan(ctx: &CommandContext<'_>, action: FanAction) -> Result<()> {
    let message = with_entry(ctx, |integration| {
        let fan = integration.entities().fan.clone();
        async move {
            match action {
                FanAction::On { preset } => {
                    fan.turn_on(preset.map(Preset::from))
                        .await
                        .context("Failed to turn the fan on")?;
                    Ok(format!("Fan on ({})", fan.preset()))
                }
                FanAction::Off => {
                    fan.turn_off().await.context("Failed to turn the fan off")?;
                    Ok("Fan off".to_string())
                }
                FanAction::Preset { preset } => {
                    let preset = Preset::from(preset);
                    fan.set_preset(preset)
                        .await
                        .with_context(|| format!("Failed to set preset {}", preset))?;
                    Ok(format!("Fan set to {}", preset))
                }
                FanAction::Speed { percentage } => {
                    fan.set_percentage(percentage)
                        .await
                        .with_context(|| format!("Failed to set speed {}%", percentage))?;
                    Ok(format!("Fan set to {} ({}%)", fan.preset(), percentage))
                }
            }
        }
    })
    .await?;
    report(ctx, &message);
    Ok(())
}

pub async fn cmd_light(ctx: &CommandContext<'_>, action: LightAction) -> Result<()> {
    let message = with_entry(ctx, |integration| {
        let light = integration.entities().light.clone();
        async move {
            match action {
                LightAction::On { brightness } => {
                    light
                        .turn_on(brightness)
                        .await
                        .context("Failed to turn the light on")?;
                    Ok(format!("Light on (brightness {})", light.brightness()))
                }
                LightAction::Off => {
                    light.turn_off().await.context("Failed to turn the light off")?;
                    Ok("Light off".to_string())
                }
            }
        }
    })
    .await?;
    report(ctx, &message);
    Ok(())
}

/// The deco light is only exposed when enabled, so callers must set
/// `enable_decolight` on the options before connecting.
pub async fn cmd_deco(ctx: &CommandContext<'_>, action: DecoAction) -> Result<()> {
    let message = with_entry(ctx, |integration| {
        let deco = integration.entities().decolight.clone();
        async move {
            let deco = deco.ok_or_else(|| anyhow!("Deco light is disabled for this entry"))?;
            match action {
                DecoAction::On { brightness, color } => {
                    deco.turn_on(brightness, color)
                        .await
                        .context("Failed to turn the deco light on")?;
                    let (r, g, b) = deco.rgb();
                    Ok(format!(
                        "Deco light on (brightness {}, #{:02x}{:02x}{:02x})",
                        deco.brightness(),
                        r,
                        g,
                        b
                    ))
                }
                DecoAction::Off => {
                    deco.turn_off()
                        .await
                        .context("Failed to turn the deco light off")?;
                    Ok("Deco light off".to_string())
                }
            }
        }
    })
    .await?;
    report(ctx, &message);
    Ok(())
}
