//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use thermex_core::{
    ConnectionState, DelayedOffState, DisconnectReason, EntitySnapshot, FilterStatus,
    FilterThresholds, HubEvent, Integration, Preset, RuntimeManager,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self { no_color, compact }
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

// ============================================================================
// Status
// ============================================================================

/// Fan part of a status report.
#[derive(Debug, Clone, Serialize)]
pub struct FanReport {
    pub on: bool,
    pub preset: Preset,
    pub percentage: u8,
}

/// Light part of a status report.
#[derive(Debug, Clone, Serialize)]
pub struct LightReport {
    pub on: bool,
    pub brightness: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb: Option<(u8, u8, u8)>,
}

/// Runtime and filter part of a status report.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub running: bool,
    pub runtime_hours: f64,
    pub last_reset: Option<String>,
    pub days_since_reset: Option<i64>,
    pub last_preset: Preset,
    pub filter: FilterStatus,
}

/// Everything `thermex status` shows.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub entry_id: String,
    pub host: String,
    pub connection_state: ConnectionState,
    pub protocol_version: Option<String>,
    pub fan: FanReport,
    pub light: LightReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decolight: Option<LightReport>,
    pub delayed_off: DelayedOffState,
    pub runtime: RuntimeReport,
}

impl RuntimeReport {
    /// Report the state held by a runtime manager.
    pub fn from_manager(runtime: &RuntimeManager, thresholds: &FilterThresholds) -> Self {
        let runtime_hours = runtime.runtime_hours();
        let days_since_reset = runtime.days_since_reset();
        Self {
            running: runtime.is_running(),
            runtime_hours,
            last_reset: runtime.last_reset().map(str::to_string),
            days_since_reset,
            last_preset: runtime.last_preset(),
            filter: thresholds.evaluate(runtime_hours, days_since_reset),
        }
    }

    /// Collect runtime and filter state of a set-up entry.
    pub async fn collect(integration: &Integration) -> Self {
        let thresholds = integration.options().thresholds();
        let runtime = integration.runtime().lock().await;
        Self::from_manager(&runtime, &thresholds)
    }
}

impl StatusReport {
    /// Collect the current state of an entry.
    pub async fn collect(integration: &Integration) -> Self {
        let entities = integration.entities();
        let hub = integration.hub();
        Self {
            entry_id: integration.config().entry_id.clone(),
            host: integration.config().host.clone(),
            connection_state: hub.connection_state(),
            protocol_version: hub.protocol_version(),
            fan: FanReport {
                on: entities.fan.is_on(),
                preset: entities.fan.preset(),
                percentage: entities.fan.percentage(),
            },
            light: LightReport {
                on: entities.light.is_on(),
                brightness: entities.light.brightness(),
                rgb: None,
            },
            decolight: entities.decolight.as_ref().map(|deco| LightReport {
                on: deco.is_on(),
                brightness: deco.brightness(),
                rgb: Some(deco.rgb()),
            }),
            delayed_off: entities.fan.delayed_off().state(),
            runtime: RuntimeReport::collect(integration).await,
        }
    }
}

fn format_light(light: &LightReport, no_color: bool) -> String {
    if !light.on {
        return style::format_on_off(false, no_color);
    }
    let mut text = format!(
        "{} {}%",
        style::format_on_off(true, no_color),
        brightness_percent(light.brightness)
    );
    if let Some((r, g, b)) = light.rgb {
        text.push_str(&format!(" #{:02x}{:02x}{:02x}", r, g, b));
    }
    text
}

fn brightness_percent(brightness: u16) -> u32 {
    (u32::from(brightness.min(255)) * 100 + 127) / 255
}

/// Format runtime and filter rows.
pub fn format_runtime_text(runtime: &RuntimeReport, opts: &FormatOptions) -> String {
    let no_color = opts.no_color;
    let mut lines = vec![
        style::format_row(
            "Runtime",
            &format!(
                "{:.2} h{}",
                runtime.runtime_hours,
                if runtime.running { " (running)" } else { "" }
            ),
            12,
            no_color,
        ),
        style::format_row(
            "Last reset",
            runtime.last_reset.as_deref().unwrap_or("never"),
            12,
            no_color,
        ),
    ];
    if let Some(days) = runtime.days_since_reset {
        lines.push(style::format_row(
            "Filter age",
            &format!("{} days", days),
            12,
            no_color,
        ));
    }
    lines.push(style::format_row(
        "Last preset",
        &style::format_preset(runtime.last_preset, no_color),
        12,
        no_color,
    ));
    lines.push(style::format_row(
        "Filter",
        &style::format_filter_level(runtime.filter.level, no_color),
        12,
        no_color,
    ));
    if runtime.filter.alert() {
        lines.push(format!(
            "  {}",
            style::format_warning(runtime.filter.level.action(), no_color)
        ));
    }
    lines.join("\n") + "\n"
}

/// Format a status report as text.
pub fn format_status_text(report: &StatusReport, opts: &FormatOptions) -> String {
    let no_color = opts.no_color;
    let mut out = String::new();
    out.push_str(&style::format_title(
        &format!("Thermex {} ({})", report.entry_id, report.host),
        no_color,
    ));
    out.push('\n');

    let mut lines = vec![style::format_row(
        "Connection",
        &style::format_connection_state(report.connection_state, no_color),
        12,
        no_color,
    )];
    let fan = if report.fan.on {
        format!(
            "{} {} ({}%)",
            style::format_on_off(true, no_color),
            style::format_preset(report.fan.preset, no_color),
            report.fan.percentage
        )
    } else {
        style::format_on_off(false, no_color)
    };
    lines.push(style::format_row("Fan", &fan, 12, no_color));
    lines.push(style::format_row(
        "Light",
        &format_light(&report.light, no_color),
        12,
        no_color,
    ));
    if let Some(deco) = &report.decolight {
        lines.push(style::format_row(
            "Deco light",
            &format_light(deco, no_color),
            12,
            no_color,
        ));
    }
    if report.delayed_off.active {
        lines.push(style::format_row(
            "Delayed off",
            &format!(
                "in {} min ({})",
                report.delayed_off.remaining_minutes,
                report.delayed_off.scheduled_time.as_deref().unwrap_or("-")
            ),
            12,
            no_color,
        ));
    }
    out.push_str(&lines.join("\n"));
    out.push('\n');
    out.push_str(&format_runtime_text(&report.runtime, opts));
    out
}

/// Format entity snapshots as text, one per line.
pub fn format_entities_text(snapshots: &[EntitySnapshot], opts: &FormatOptions) -> String {
    let width = snapshots
        .iter()
        .map(|s| s.unique_id.len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for snapshot in snapshots {
        let state = match &snapshot.state {
            Value::Null => "unknown".to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&style::format_row(
            &snapshot.unique_id,
            &state,
            width,
            opts.no_color,
        ));
        out.push('\n');
    }
    out
}

// ============================================================================
// Watch
// ============================================================================

/// A bus event stamped with the time it was seen.
#[derive(Debug, Clone, Serialize)]
pub struct WatchRecord<'a> {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: &'a HubEvent,
}

impl<'a> WatchRecord<'a> {
    pub fn new(event: &'a HubEvent, at: OffsetDateTime) -> Self {
        Self {
            timestamp: at.format(&Rfc3339).unwrap_or_default(),
            event,
        }
    }
}

fn describe_disconnect(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::UserRequested => "closed".to_string(),
        DisconnectReason::SocketClosed => "socket closed by hood".to_string(),
        DisconnectReason::Stale => "connection went stale".to_string(),
        DisconnectReason::SendFailed(e) => format!("send failed: {}", e),
        DisconnectReason::Error(e) => format!("receive failed: {}", e),
        other => format!("{:?}", other),
    }
}

/// Describe an event in one line, without timestamp.
pub fn describe_event(event: &HubEvent, no_color: bool) -> String {
    match event {
        HubEvent::Notify { kind, data } => {
            let body = data
                .as_object()
                .and_then(|obj| obj.values().next())
                .unwrap_or(data);
            format!("{:<10} {}", kind, body)
        }
        HubEvent::DelayedOff(state) if state.active => format!(
            "{:<10} fan off in {} min",
            "delayed", state.remaining_minutes
        ),
        HubEvent::DelayedOff(_) => format!("{:<10} inactive", "delayed"),
        HubEvent::Connected => style::format_success("connected", no_color),
        HubEvent::Disconnected { reason } => {
            style::format_warning(&format!("disconnected: {}", describe_disconnect(reason)), no_color)
        }
        HubEvent::ReconnectStarted { attempt } => {
            style::format_info(&format!("reconnecting (attempt {})", attempt), no_color)
        }
        HubEvent::ReconnectSucceeded { attempts } => style::format_success(
            &format!("reconnected after {} attempt(s)", attempts),
            no_color,
        ),
        HubEvent::ReconnectFailed { attempts, error } => style::format_warning(
            &format!("reconnect failed after {} attempt(s): {}", attempts, error),
            no_color,
        ),
        other => format!("{:?}", other),
    }
}

/// Format one watch line.
pub fn format_watch_line(event: &HubEvent, at: OffsetDateTime, opts: &FormatOptions) -> String {
    format!(
        "[{:02}:{:02}:{:02}] {}\n",
        at.hour(),
        at.minute(),
        at.second(),
        describe_event(event, opts.no_color)
    )
}

/// Format one watch record as a single JSON line.
pub fn format_watch_json(event: &HubEvent, at: OffsetDateTime) -> Result<String> {
    Ok(serde_json::to_string(&WatchRecord::new(event, at))? + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thermex_core::FilterLevel;

    fn opts() -> FormatOptions {
        FormatOptions::new(true, false)
    }

    fn runtime(hours: f64) -> RuntimeReport {
        let thresholds = FilterThresholds::default();
        RuntimeReport {
            running: false,
            runtime_hours: hours,
            last_reset: Some("2026-01-01T00:00:00Z".to_string()),
            days_since_reset: Some(10),
            last_preset: Preset::High,
            filter: thresholds.evaluate(hours, Some(10)),
        }
    }

    fn report() -> StatusReport {
        StatusReport {
            entry_id: "kitchen".to_string(),
            host: "10.0.0.5".to_string(),
            connection_state: ConnectionState::Connected,
            protocol_version: Some("1.0".to_string()),
            fan: FanReport {
                on: true,
                preset: Preset::Medium,
                percentage: 50,
            },
            light: LightReport {
                on: true,
                brightness: 255,
                rgb: None,
            },
            decolight: Some(LightReport {
                on: true,
                brightness: 128,
                rgb: Some((255, 0, 16)),
            }),
            delayed_off: DelayedOffState::default(),
            runtime: runtime(3.5),
        }
    }

    #[test]
    fn test_status_text() {
        let text = format_status_text(&report(), &opts());
        assert!(text.starts_with("Thermex kitchen (10.0.0.5)"));
        assert!(text.contains("[connected]"));
        assert!(text.contains("[ON] medium (50%)"));
        assert!(text.contains("[ON] 100%"));
        assert!(text.contains("#ff0010"));
        assert!(text.contains("3.50 h"));
        assert!(text.contains("Filter OK"));
        assert!(!text.contains("Delayed off"));
    }

    #[test]
    fn test_runtime_text_warns_on_alert() {
        let runtime = runtime(42.0);
        assert_eq!(runtime.filter.level, FilterLevel::RuntimeExceeded);
        let text = format_runtime_text(&runtime, &opts());
        assert!(text.contains("[!!] Clean the grease filter"));
    }

    #[test]
    fn test_status_json() {
        let json = opts().as_json(&report()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["fan"]["preset"], "medium");
        assert_eq!(value["connection_state"], "connected");
        assert_eq!(value["decolight"]["rgb"], json!([255, 0, 16]));
        assert!(value["light"].get("rgb").is_none());
    }

    #[test]
    fn test_compact_json() {
        let json = FormatOptions::new(true, true).as_json(&json!({"a": 1})).unwrap();
        assert_eq!(json, "{\"a\":1}\n");
    }

    #[test]
    fn test_brightness_percent() {
        assert_eq!(brightness_percent(0), 0);
        assert_eq!(brightness_percent(128), 50);
        assert_eq!(brightness_percent(255), 100);
    }

    #[test]
    fn test_describe_notify_unwraps_section() {
        let event = HubEvent::notify("fan", json!({"Fan": {"fanonoff": 1, "fanspeed": 2}}));
        let line = describe_event(&event, true);
        assert!(line.starts_with("fan"));
        assert!(line.contains("\"fanspeed\":2"));
        assert!(!line.contains("\"Fan\""));
    }

    #[test]
    fn test_watch_line_and_json() {
        let at = OffsetDateTime::UNIX_EPOCH;
        let line = format_watch_line(&HubEvent::Connected, at, &opts());
        assert_eq!(line, "[00:00:00] [OK] connected\n");

        let json = format_watch_json(&HubEvent::ReconnectStarted { attempt: 2 }, at).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "reconnect_started");
        assert_eq!(value["attempt"], 2);
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");
    }
}
