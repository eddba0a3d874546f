//! Visual styling utilities for the CLI.
//!
//! Every helper takes `no_color` and falls back to bracketed ASCII labels so
//! output stays readable when piped.

use owo_colors::OwoColorize;
use thermex_core::{ConnectionState, FilterLevel, Preset};

// ============================================================================
// Status Labels
// ============================================================================

/// Format an on/off state.
pub fn format_on_off(on: bool, no_color: bool) -> String {
    match (on, no_color) {
        (true, true) => "[ON]".to_string(),
        (false, true) => "[OFF]".to_string(),
        (true, false) => format!("[{}]", "ON".green()),
        (false, false) => format!("[{}]", "OFF".dimmed()),
    }
}

/// Format a fan preset, colored by intensity.
pub fn format_preset(preset: Preset, no_color: bool) -> String {
    let label = preset.name();
    if no_color {
        return label.to_string();
    }
    match preset {
        Preset::Off => label.dimmed().to_string(),
        Preset::Low | Preset::Medium => label.green().to_string(),
        Preset::High => label.yellow().to_string(),
        Preset::Boost => label.red().bold().to_string(),
    }
}

/// Format a connection state.
pub fn format_connection_state(state: ConnectionState, no_color: bool) -> String {
    let label = state.as_str();
    if no_color {
        return format!("[{}]", label);
    }
    match state {
        ConnectionState::Connected => format!("[{}]", label.green()),
        ConnectionState::Error => format!("[{}]", label.red()),
        ConnectionState::Closed | ConnectionState::Disconnected => {
            format!("[{}]", label.dimmed())
        }
        _ => format!("[{}]", label.yellow()),
    }
}

/// Format the filter condition.
pub fn format_filter_level(level: FilterLevel, no_color: bool) -> String {
    let label = level.description();
    if no_color {
        return label.to_string();
    }
    match level {
        FilterLevel::Ok => label.green().to_string(),
        FilterLevel::BothExceeded => label.red().bold().to_string(),
        _ => label.yellow().to_string(),
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an info message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {}", message)
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

// ============================================================================
// Section Headers
// ============================================================================

/// Format a title header.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        format!("{}\n{}", title, "━".repeat(title.chars().count()))
    } else {
        format!(
            "{}\n{}",
            title.bold(),
            "━".repeat(title.chars().count()).dimmed()
        )
    }
}

/// Format a `label: value` row with the label padded to `width`.
pub fn format_row(label: &str, value: &str, width: usize, no_color: bool) -> String {
    let padded = format!("{:<width$}", format!("{}:", label), width = width + 1);
    if no_color {
        format!("  {} {}", padded, value)
    } else {
        format!("  {} {}", padded.cyan(), value)
    }
}
