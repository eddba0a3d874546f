//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use thermex_core::{ConnectionState, Integration};
use thermex_store::Store;
use tracing::debug;

use crate::config::Config;
use crate::style;

/// How long to wait for the initial status after authenticating.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Entities are fed from the dispatch bus asynchronously; give the router a
/// moment to apply the initial fan-out.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Open the runtime state store named by the config.
pub fn open_store(config: &Config) -> Result<Arc<Store>> {
    let store = match &config.storage.path {
        Some(dir) => Store::open(dir)
            .with_context(|| format!("Failed to open state directory {}", dir.display()))?,
        None => Store::open_default().context("Failed to open default state directory")?,
    };
    Ok(Arc::new(store))
}

/// Set up the configured hood and wait until its initial status is loaded.
pub async fn connect(config: &Config, quiet: bool, no_color: bool) -> Result<Integration> {
    let entry = config.entry_config()?;
    let store = open_store(config)?;

    if !quiet {
        eprintln!(
            "{}",
            style::format_info(&format!("Connecting to {}...", entry.host), no_color)
        );
    }
    let host = entry.host.clone();
    let integration = Integration::setup(entry, config.options.clone(), store)
        .await
        .with_context(|| format!("Failed to connect to hood at {}", host))?;

    let mut state = integration.hub().subscribe_state();
    let reached = match tokio::time::timeout(
        STARTUP_TIMEOUT,
        state.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Error)),
    )
    .await
    {
        Ok(Ok(state)) => *state,
        _ => integration.hub().connection_state(),
    };
    if reached != ConnectionState::Connected {
        let error = integration.hub().last_error();
        integration.unload().await;
        bail!(
            "Hood at {} did not report its status{}",
            host,
            error.map(|e| format!(": {}", e)).unwrap_or_default()
        );
    }
    tokio::time::sleep(SETTLE_DELAY).await;
    debug!("Hood at {} ready", host);
    Ok(integration)
}

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_open_store_uses_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.path = Some(dir.path().join("state"));

        let store = open_store(&config).unwrap();
        assert_eq!(store.dir(), Some(dir.path().join("state").as_path()));
    }
}
