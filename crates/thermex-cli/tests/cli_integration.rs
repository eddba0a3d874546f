//! CLI Integration Tests
//!
//! These tests run the `thermex` binary for commands that do not need a hood
//! on the network: help, configuration and offline runtime inspection.

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use thermex_core::RuntimeManager;
use thermex_store::Store;

/// Run thermex with a clean environment and the given config file.
fn run_thermex(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_thermex"))
        .env_remove("THERMEX_HOST")
        .env_remove("THERMEX_API_KEY")
        .env_remove("THERMEX_CONFIG")
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("Failed to run thermex binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_thermex(&dir.path().join("config.toml"), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["status", "fan", "light", "deco", "watch", "runtime", "delayed-off"] {
        assert!(text.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_thermex(&dir.path().join("config.toml"), &["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_fan_speed_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_thermex(&dir.path().join("config.toml"), &["fan", "speed", "150"]);
    assert!(!output.status.success());
}

#[test]
fn test_completions() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_thermex(&dir.path().join("config.toml"), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("thermex"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_path_prints_given_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let output = run_thermex(&path, &["config", "path"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), path.display().to_string());
}

#[test]
fn test_config_init_show_and_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thermex").join("config.toml");

    let output = run_thermex(
        &path,
        &["config", "init", "--host", "10.0.0.5", "--api-key", "4321"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(path.exists());

    let output = run_thermex(&path, &["config", "show"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("10.0.0.5"));
    assert!(!text.contains("4321"));

    let output = run_thermex(&path, &["config", "check"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("valid"));

    // A second init refuses to overwrite.
    let output = run_thermex(
        &path,
        &["config", "init", "--host", "10.0.0.6", "--api-key", "1"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--force"));
}

#[test]
fn test_config_show_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[hood]\nhost = \"hood.local\"\napi_key = \"1\"\n").unwrap();

    let output = run_thermex(&path, &["--json", "config", "show"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["hood"]["host"], "hood.local");
    assert_eq!(value["options"]["delayed_off_minutes"], 30);
}

#[test]
fn test_config_check_reports_every_problem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[options]\ndelayed_off_minutes = 500\n").unwrap();

    let output = run_thermex(&path, &["config", "check"]);
    assert!(!output.status.success());
    let text = stderr(&output);
    assert!(text.contains("hood.host"));
    assert!(text.contains("hood.api_key"));
    assert!(text.contains("delayed_off_minutes"));
}

#[test]
fn test_status_without_host_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_thermex(&dir.path().join("missing.toml"), &["status"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("hood.host"));
}

#[test]
fn test_unparsable_config_names_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[hood\n").unwrap();

    let output = run_thermex(&path, &["status"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("broken.toml"));
}

// =============================================================================
// Runtime
// =============================================================================

#[test]
fn test_runtime_show_reads_stored_state() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "[hood]\nhost = \"10.0.0.5\"\napi_key = \"1\"\nentry_id = \"kitchen\"\n\n\
             [options]\nfan_alert_hours = 4\n\n[storage]\npath = {:?}\n",
            state_dir.display().to_string()
        ),
    )
    .unwrap();

    let store = Arc::new(Store::open(&state_dir).unwrap());
    let mut runtime = RuntimeManager::new(store, "kitchen");
    let now = time::OffsetDateTime::now_utc();
    runtime.start_at(now - time::Duration::hours(5));
    runtime.stop_at(now);
    runtime.save().unwrap();

    let output = run_thermex(&path, &["runtime", "show", "--format", "json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let hours = value["runtime_hours"].as_f64().unwrap();
    assert!((hours - 5.0).abs() < 0.01);
    assert_eq!(value["running"], false);
    assert_eq!(value["filter"]["level"], "runtime_exceeded");

    let output = run_thermex(&path, &["runtime", "show"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("5.00 h"));
    assert!(text.contains("[!!]"));
}
