//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use thermex_types::Preset;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Fan preset as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    Off,
    Low,
    Medium,
    High,
    Boost,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Off => Preset::Off,
            PresetArg::Low => Preset::Low,
            PresetArg::Medium => Preset::Medium,
            PresetArg::High => Preset::High,
            PresetArg::Boost => Preset::Boost,
        }
    }
}

/// Reusable connection arguments
#[derive(Debug, Clone, Args)]
pub struct HoodArgs {
    /// Hostname or IP address of the hood (overrides the config file)
    #[arg(short = 'H', long, env = "THERMEX_HOST", global = true)]
    pub host: Option<String>,

    /// API key of the hood (overrides the config file)
    #[arg(short = 'k', long, env = "THERMEX_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// WebSocket port (overrides the config file)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,
}

#[derive(Parser)]
#[command(name = "thermex")]
#[command(author, version, about = "CLI for Thermex extractor hoods", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as JSON (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "THERMEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub hood: HoodArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective output format.
    pub fn format(&self, format: OutputFormat) -> OutputFormat {
        if self.json { OutputFormat::Json } else { format }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show fan, lights, runtime and filter state
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Print every entity snapshot instead of the summary
        #[arg(long)]
        entities: bool,
    },

    /// Control the extractor fan
    Fan {
        #[command(subcommand)]
        action: FanAction,
    },

    /// Control the main light
    Light {
        #[command(subcommand)]
        action: LightAction,
    },

    /// Control the decorative RGB light
    Deco {
        #[command(subcommand)]
        action: DecoAction,
    },

    /// Stream hood notifications and connection events
    Watch {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Number of events to print before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,
    },

    /// Show or reset the fan runtime counter
    Runtime {
        #[command(subcommand)]
        action: RuntimeAction,
    },

    /// Turn the fan off after a delay, staying attached until it fires
    DelayedOff {
        /// Delay in minutes (1-120, defaults to the configured value)
        #[arg(value_parser = clap::value_parser!(u32).range(1..=120))]
        minutes: Option<u32>,
    },

    /// Print a diagnostics snapshot of the session
    Diagnostics,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Fan subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum FanAction {
    /// Turn the fan on (last used preset unless one is given)
    On {
        /// Preset to run at
        #[arg(value_enum)]
        preset: Option<PresetArg>,
    },

    /// Turn the fan off
    Off,

    /// Switch to a preset
    Preset {
        #[arg(value_enum)]
        preset: PresetArg,
    },

    /// Set the speed as a percentage
    Speed {
        /// Percentage 0-100 (0 turns the fan off)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percentage: u8,
    },
}

/// Light subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum LightAction {
    /// Turn the light on
    On {
        /// Brightness 0-255 (keeps the current brightness when omitted)
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(0..=255))]
        brightness: Option<u16>,
    },

    /// Turn the light off
    Off,
}

/// Deco light subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum DecoAction {
    /// Turn the deco light on
    On {
        /// Brightness 0-255 (keeps the current brightness when omitted)
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(0..=255))]
        brightness: Option<u16>,

        /// Colour as R,G,B or #RRGGBB
        #[arg(long, value_parser = parse_rgb)]
        color: Option<(u8, u8, u8)>,
    },

    /// Turn the deco light off
    Off,
}

/// Runtime subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum RuntimeAction {
    /// Show runtime hours and filter state
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Reset the runtime counter after cleaning the filter
    Reset,
}

/// Configuration subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration (API key redacted)
    Show,

    /// Show configuration file path
    Path,

    /// Write a configuration file from --host, --api-key and --port
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file
    Check,
}

/// Parse a colour given as `R,G,B` or `#RRGGBB`
pub fn parse_rgb(s: &str) -> Result<(u8, u8, u8), String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 {
            return Err(format!("'{}' is not a #RRGGBB colour", s));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| format!("'{}' is not a #RRGGBB colour", s))
        };
        return Ok((channel(0)?, channel(2)?, channel(4)?));
    }

    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("'{}' must be R,G,B or #RRGGBB", s));
    }
    let channel = |p: &str| {
        p.parse::<u8>()
            .map_err(|_| format!("'{}' is not a colour channel (0-255)", p))
    };
    Ok((channel(parts[0])?, channel(parts[1])?, channel(parts[2])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rgb() {
        assert_eq!(parse_rgb("255,0,128"), Ok((255, 0, 128)));
        assert_eq!(parse_rgb(" 1, 2 ,3 "), Ok((1, 2, 3)));
        assert_eq!(parse_rgb("#ff8000"), Ok((255, 128, 0)));
        assert!(parse_rgb("256,0,0").is_err());
        assert!(parse_rgb("1,2").is_err());
        assert!(parse_rgb("#fff").is_err());
        assert!(parse_rgb("#gg0000").is_err());
    }

    #[test]
    fn test_preset_arg_conversion() {
        assert_eq!(Preset::from(PresetArg::Boost), Preset::Boost);
        assert_eq!(Preset::from(PresetArg::Off), Preset::Off);
    }

    #[test]
    fn test_parse_fan_speed() {
        let cli = Cli::try_parse_from(["thermex", "fan", "speed", "60"]).unwrap();
        match cli.command {
            Commands::Fan {
                action: FanAction::Speed { percentage },
            } => assert_eq!(percentage, 60),
            _ => panic!("expected fan speed"),
        }
        assert!(Cli::try_parse_from(["thermex", "fan", "speed", "101"]).is_err());
    }

    #[test]
    fn test_json_flag_overrides_format() {
        let cli = Cli::try_parse_from(["thermex", "--json", "status"]).unwrap();
        assert_eq!(cli.format(OutputFormat::Text), OutputFormat::Json);
    }

    #[test]
    fn test_config_init_takes_global_hood_args() {
        let cli = Cli::try_parse_from([
            "thermex", "config", "init", "--host", "10.0.0.5", "--api-key", "1",
        ])
        .unwrap();
        assert_eq!(cli.hood.host.as_deref(), Some("10.0.0.5"));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: false }
            }
        ));
    }

    #[test]
    fn test_delayed_off_range() {
        assert!(Cli::try_parse_from(["thermex", "delayed-off", "0"]).is_err());
        assert!(Cli::try_parse_from(["thermex", "delayed-off", "121"]).is_err());
        assert!(Cli::try_parse_from(["thermex", "delayed-off", "45"]).is_ok());
        assert!(Cli::try_parse_from(["thermex", "delayed-off"]).is_ok());
    }
}
