//! Integration tests for the reposter binary
//!
//! These cover the startup paths that fail before any network access.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn reposter(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reposter").unwrap();
    cmd.env_remove("REPOSTER_CONFIG")
        .env("HOME", temp_dir.path())
        .env("REPOSTER_LOG_LEVEL", "warn");
    cmd
}

fn write_config(temp_dir: &TempDir, body: &str) -> String {
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_help_describes_daemon() {
    let temp_dir = TempDir::new().unwrap();

    reposter(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reposter"))
        .stdout(predicate::str::contains("--interval"));
}

#[test]
fn test_missing_config_writes_template_and_exits_1() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("conf").join("config.toml");

    reposter(&temp_dir)
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Created a config template"));

    // Emitted as a log event, not only as the final error line
    reposter(&temp_dir)
        .arg("--config")
        .arg(temp_dir.path().join("other.toml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Please fill in your credentials"));

    let template = fs::read_to_string(&config_path).unwrap();
    assert!(template.contains("source_username"));
    assert!(template.contains("target_password"));
    assert!(template.contains("check_interval = 3000"));
}

#[test]
fn test_config_path_from_environment() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("env-config.toml");

    reposter(&temp_dir)
        .env("REPOSTER_CONFIG", &config_path)
        .assert()
        .code(1);

    assert!(config_path.exists());
}

#[test]
fn test_blank_credentials_exit_1() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(
        &temp_dir,
        r#"
source_username = "natgeo"
target_username = ""
target_password = "hunter2"
"#,
    );

    reposter(&temp_dir)
        .args(["--config", &config])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("target_username"));
}

#[test]
fn test_invalid_toml_exit_1() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "source_username = [unterminated");

    reposter(&temp_dir)
        .args(["--config", &config])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_zero_interval_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(
        &temp_dir,
        r#"
source_username = "natgeo"
target_username = "mirror"
target_password = "hunter2"
"#,
    );

    reposter(&temp_dir)
        .args(["--config", &config, "--interval", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("at least 1 second"));
}

#[test]
fn test_unknown_log_format_is_usage_error() {
    let temp_dir = TempDir::new().unwrap();

    reposter(&temp_dir)
        .args(["--log-format", "xml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid log format"));
}

#[test]
fn test_fatal_startup_error_reaches_log_file() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = temp_dir.path().join("ids.json");
    let log_file = temp_dir.path().join("logs").join("reposter.log");
    fs::write(&ledger, "{not json").unwrap();
    let config = write_config(
        &temp_dir,
        &format!(
            r#"
source_username = "natgeo"
target_username = "mirror"
target_password = "hunter2"

[storage]
ledger_path = "{}"
staging_dir = "{}"
log_file = "{}"
"#,
            ledger.display(),
            temp_dir.path().join("staging").display(),
            log_file.display()
        ),
    );

    reposter(&temp_dir)
        .args(["--config", &config])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("corrupted"));

    let logged = fs::read_to_string(&log_file).unwrap();
    assert!(logged.contains("Fatal error"));
    assert!(logged.contains("corrupted"));
}
