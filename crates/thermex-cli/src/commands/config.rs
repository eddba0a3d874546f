//! Config command implementation.

use std::path::Path;

use anyhow::Result;

use crate::cli::ConfigAction;
use crate::config::{Config, ConfigError};
use crate::format::FormatOptions;
use crate::style;

pub fn cmd_config(
    action: ConfigAction,
    path: &Path,
    config: &Config,
    json: bool,
    opts: &FormatOptions,
) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let redacted = config.redacted();
            if json {
                print!("{}", opts.as_json(&redacted)?);
            } else {
                print!("{}", toml::to_string_pretty(&redacted)?);
            }
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(ConfigError::Exists(path.to_path_buf()).into());
            }
            // `config` holds the defaults plus the command line overrides
            config.validate()?;
            config.save(path)?;
            println!(
                "{}",
                style::format_success(
                    &format!("Wrote {}", path.display()),
                    opts.no_color
                )
            );
        }
        ConfigAction::Check => {
            config.validate()?;
            println!(
                "{}",
                style::format_success("Configuration is valid", opts.no_color)
            );
        }
    }
    Ok(())
}
