//! Integration tests for the `proxyscope` CLI binary.
//!
//! These tests validate argument parsing, help output and error handling
//! without a live control plane.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `proxyscope` binary with env isolation.
///
/// Clears all `PROXYSCOPE_*` env vars and points the config file at
/// `config` so tests never touch the user's real configuration.
fn proxyscope_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("proxyscope");
    cmd.env("PROXYSCOPE_CONFIG", config)
        .env_remove("PROXYSCOPE_PROFILE")
        .env_remove("PROXYSCOPE_API")
        .env_remove("PROXYSCOPE_ACCESS_KEY")
        .env_remove("PROXYSCOPE_OUTPUT")
        .env_remove("PROXYSCOPE_INSECURE")
        .env_remove("PROXYSCOPE_TIMEOUT")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = proxyscope_cmd(&dir.path().join("config.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("snapshot")
                .and(predicate::str::contains("watch"))
                .and(predicate::str::contains("close"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("proxyscope"));
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .arg("frobnicate")
        .assert()
        .code(2);
}

#[test]
fn test_invalid_mode_rejected() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .args(["snapshot", "--mode", "sideways"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sideways"));
}

#[test]
fn test_invalid_output_format() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .args(["snapshot", "-o", "xml"])
        .assert()
        .code(2);
}

#[test]
fn test_close_requires_ids() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .arg("close")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("<IDS>"));
}

#[test]
fn test_close_rejects_non_numeric_ids() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .args(["close", "abc"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_api_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = proxyscope_cmd(&dir.path().join("config.toml"))
        .args(["--api", "ftp://proxy.local", "snapshot"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("http or https"), "Unexpected output:\n{text}");
}

// ── Missing configuration ───────────────────────────────────────────

#[test]
fn test_snapshot_without_config() {
    let dir = tempfile::tempdir().unwrap();
    let output = proxyscope_cmd(&dir.path().join("config.toml"))
        .arg("snapshot")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("No control plane configured") && text.contains("--api"),
        "Expected no-config diagnostic:\n{text}"
    );
}

#[test]
fn test_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.home]\napi = \"http://127.0.0.1:9090\"\n").unwrap();

    let output = proxyscope_cmd(&path)
        .args(["--profile", "office", "snapshot"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("office") && text.contains("home"),
        "Expected profile diagnostic:\n{text}"
    );
}

#[test]
fn test_unreachable_control_plane() {
    let dir = tempfile::tempdir().unwrap();
    proxyscope_cmd(&dir.path().join("config.toml"))
        .args(["--api", "http://127.0.0.1:1", "--timeout", "5", "snapshot"])
        .assert()
        .code(7);
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honours_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    proxyscope_cmd(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_redacts_access_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "default_profile = \"home\"\n\n\
         [profiles.home]\n\
         api = \"http://127.0.0.1:9090\"\n\
         access_key = \"hunter2\"\n",
    )
    .unwrap();

    proxyscope_cmd(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("<redacted>")
                .and(predicate::str::contains("127.0.0.1:9090"))
                .and(predicate::str::contains("hunter2").not()),
        );
}
