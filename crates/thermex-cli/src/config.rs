//! Configuration file management.
//!
//! The CLI reads one TOML file describing the hood and the entry options:
//!
//! ```toml
//! [hood]
//! host = "192.168.1.40"
//! api_key = "1234"
//! entry_id = "kitchen"
//!
//! [options]
//! enable_decolight = true
//! delayed_off_minutes = 30
//!
//! [storage]
//! path = "/var/lib/thermex"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thermex_core::{EntryConfig, EntryOptions};

use crate::cli::HoodArgs;

/// Entry id used when the config file does not name one.
pub const DEFAULT_ENTRY_ID: &str = "default";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hood connection settings
    #[serde(default)]
    pub hood: HoodConfig,

    /// Entry options (thresholds, delays, watchdog timing)
    #[serde(default)]
    pub options: EntryOptions,

    /// Runtime state storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Hood connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoodConfig {
    /// Hostname or IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// API key (pairing code)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// WebSocket port, the hood default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Identifier keying the persisted runtime state
    #[serde(default = "default_entry_id")]
    pub entry_id: String,
}

impl Default for HoodConfig {
    fn default() -> Self {
        Self {
            host: None,
            api_key: None,
            port: None,
            entry_id: default_entry_id(),
        }
    }
}

fn default_entry_id() -> String {
    DEFAULT_ENTRY_ID.to_string()
}

/// Runtime state storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for runtime state, the platform data directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config file already exists: {0} (use --force to overwrite)")]
    Exists(PathBuf),
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g. `hood.host`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default config file path (`<config dir>/thermex/config.toml`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thermex")
        .join("config.toml")
}

impl Config {
    /// Load config from `path`. A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply command line and environment overrides.
    pub fn apply_overrides(&mut self, args: &HoodArgs) {
        if let Some(host) = &args.host {
            self.hood.host = Some(host.clone());
        }
        if let Some(api_key) = &args.api_key {
            self.hood.api_key = Some(api_key.clone());
        }
        if let Some(port) = args.port {
            self.hood.port = Some(port);
        }
    }

    /// Check every field, collecting all problems.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match self.hood.host.as_deref().map(str::trim) {
            None => errors.push(ValidationError::new(
                "hood.host",
                "not set (use --host, THERMEX_HOST or `thermex config init`)",
            )),
            Some("") => errors.push(ValidationError::new("hood.host", "must not be empty")),
            Some(host) if host.contains('/') || host.contains(' ') => errors.push(
                ValidationError::new("hood.host", format!("'{}' is not a hostname", host)),
            ),
            Some(_) => {}
        }
        match self.hood.api_key.as_deref() {
            None => errors.push(ValidationError::new(
                "hood.api_key",
                "not set (use --api-key or THERMEX_API_KEY)",
            )),
            Some("") => errors.push(ValidationError::new("hood.api_key", "must not be empty")),
            Some(_) => {}
        }
        if self.hood.port == Some(0) {
            errors.push(ValidationError::new("hood.port", "must not be 0"));
        }
        if self.hood.entry_id.trim().is_empty() {
            errors.push(ValidationError::new("hood.entry_id", "must not be empty"));
        }
        if let Err(e) = self.options.validate() {
            errors.push(ValidationError::new("options", e.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Validated entry configuration for the hood.
    pub fn entry_config(&self) -> Result<EntryConfig, ConfigError> {
        self.validate()?;
        let host = self.hood.host.clone().unwrap_or_default();
        let api_key = self.hood.api_key.clone().unwrap_or_default();
        let mut entry = EntryConfig::new(&self.hood.entry_id, host.trim(), api_key);
        if let Some(port) = self.hood.port {
            entry = entry.port(port);
        }
        Ok(entry)
    }

    /// Copy of the config with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.hood.api_key.is_some() {
            config.hood.api_key = Some("**REDACTED**".to_string());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn for_hood(host: &str, api_key: &str) -> Config {
        let mut config = Config::default();
        config.hood.host = Some(host.to_string());
        config.hood.api_key = Some(api_key.to_string());
        config
    }

    fn no_overrides() -> HoodArgs {
        HoodArgs {
            host: None,
            api_key: None,
            port: None,
        }
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.hood.entry_id, DEFAULT_ENTRY_ID);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = for_hood("10.0.0.5", "1234");
        config.options.enable_decolight = true;
        config.options.delayed_off_minutes = 45;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_options_table_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[hood]\nhost = \"hood.local\"\napi_key = \"1\"\n\n[options]\nfan_alert_hours = 50\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.options.fan_alert_hours, 50);
        assert_eq!(config.options.fan_alert_days, 90);
        assert_eq!(config.options.delayed_off_minutes, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[hood\nhost = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.hood.port = Some(0);
        config.options.delayed_off_minutes = 0;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["hood.host", "hood.api_key", "hood.port", "options"]);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = for_hood("10.0.0.5", "1234");
        config.apply_overrides(&HoodArgs {
            host: Some("10.0.0.9".to_string()),
            api_key: None,
            port: Some(8080),
        });
        assert_eq!(config.hood.host.as_deref(), Some("10.0.0.9"));
        assert_eq!(config.hood.api_key.as_deref(), Some("1234"));

        let entry = config.entry_config().unwrap();
        assert_eq!(entry.host, "10.0.0.9");
        assert_eq!(entry.port, Some(8080));
        assert_eq!(entry.entry_id, DEFAULT_ENTRY_ID);

        config.apply_overrides(&no_overrides());
        assert_eq!(config.hood.port, Some(8080));
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let config = for_hood("10.0.0.5", "1234").redacted();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("1234"));
        assert!(text.contains("REDACTED"));
    }
}
