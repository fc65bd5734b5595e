//! Integration test: invoke the built `nodebox` binary.
//!
//! Only commands that never reach docker or the node API are exercised.

use std::process::{Command, Output};

fn nodebox(args: &[&str]) -> Output {
    let dir = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_nodebox"))
        .args(args)
        .env("RUST_LOG", "error")
        .env("SETTINGS_FILE", dir.path().join("settings.json"))
        .env("USER_PASSWORD_FILE", dir.path().join("user.json"))
        .output()
        .unwrap()
}

#[test]
fn test_version() {
    let output = nodebox(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("nodebox version "));
}

#[test]
fn test_settings_update_must_be_json() {
    let output = nodebox(&["settings", "save", "not json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid settings update"));
}

#[test]
fn test_unknown_service_rejected() {
    let output = nodebox(&["update", "manager"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Validation error"));
}

#[test]
fn test_missing_config_file() {
    let output = nodebox(&["--config", "/nonexistent/nodebox.json", "status"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/nodebox.json"));
}
