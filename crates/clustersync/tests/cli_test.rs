//! Integration tests for the `clustersync` CLI binary.
//!
//! Argument parsing, config handling, and the snapshot command against a
//! mock aggregator. No real cluster is needed.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

const ENV_VARS: [&str; 10] = [
    "CLUSTERSYNC_PROFILE",
    "CLUSTERSYNC_AGGREGATOR",
    "CLUSTERSYNC_CLUSTER",
    "CLUSTERSYNC_LIVE",
    "CLUSTERSYNC_TOKEN",
    "CLUSTERSYNC_OUTPUT",
    "CLUSTERSYNC_INSECURE",
    "CLUSTERSYNC_TIMEOUT",
    "CLUSTERSYNC_DEFAULT_PROFILE",
    "RUST_LOG",
];

/// Build a command for the `clustersync` binary with env isolation.
///
/// Clears `CLUSTERSYNC_*` variables and points config directories at
/// `config_home` so tests never touch the user's real configuration.
fn clustersync_in(config_home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("clustersync");
    cmd.env("HOME", config_home).env("XDG_CONFIG_HOME", config_home);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn clustersync_cmd() -> assert_cmd::Command {
    clustersync_in(Path::new("/tmp/clustersync-cli-test-nonexistent"))
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Write a config with one `lab` profile to `home/clustersync/config.toml`.
fn write_profile(home: &Path, aggregator: &str) {
    let dir = home.join("clustersync");
    std::fs::create_dir_all(&dir).unwrap();
    let toml = format!(
        r#"default_profile = "lab"

[profiles.lab]
aggregator = "{aggregator}"
cluster = "https://pve-01:8006"
token = "s3cret"
"#
    );
    std::fs::write(dir.join("config.toml"), toml).unwrap();
}

/// Run a prepared command off the async runtime.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = clustersync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_flag() {
    clustersync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("snapshot")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    clustersync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clustersync"));
}

#[test]
fn test_completions_bash() {
    clustersync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    clustersync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = clustersync_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("foobar"));
}

#[test]
fn test_snapshot_without_config() {
    clustersync_cmd()
        .arg("snapshot")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No configuration found"));
}

#[test]
fn test_snapshot_without_token() {
    clustersync_cmd()
        .args([
            "--aggregator",
            "http://127.0.0.1:9/api/cluster/snapshot",
            "--cluster",
            "https://pve-01:8006",
            "snapshot",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No session token"));
}

#[test]
fn test_unknown_profile() {
    clustersync_cmd()
        .args(["--profile", "nope", "snapshot"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

#[test]
fn test_watch_requires_live_address() {
    clustersync_cmd()
        .args([
            "--aggregator",
            "http://127.0.0.1:9/api/cluster/snapshot",
            "--cluster",
            "https://pve-01:8006",
            "--token",
            "s3cret",
            "watch",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("live"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path() {
    clustersync_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_masks_token() {
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), "http://127.0.0.1:9/api/cluster/snapshot");

    clustersync_in(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.lab]")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("s3cret").not()),
        );
}

#[test]
fn test_config_profiles_marks_default() {
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), "http://127.0.0.1:9/api/cluster/snapshot");

    clustersync_in(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lab *"));
}

// ── Snapshot against a mock aggregator ──────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_nodes_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "nodes": [
                { "id": "pve-01", "status": "online" },
                { "id": "pve-02", "status": "offline" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_profile(
        home.path(),
        &format!("{}/api/cluster/snapshot", server.uri()),
    );
    let mut cmd = clustersync_in(home.path());
    cmd.args(["snapshot", "nodes", "-o", "json-compact", "--node", "pve-02"]);

    let output = run(cmd).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let nodes: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(nodes.as_array().map(Vec::len), Some(1));
    assert_eq!(nodes[0]["id"], "pve-02");
    assert_eq!(nodes[0]["status"], "offline");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_backend_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "auth failed"
        })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_profile(
        home.path(),
        &format!("{}/api/cluster/snapshot", server.uri()),
    );
    let mut cmd = clustersync_in(home.path());
    cmd.arg("snapshot");

    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("auth failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_rejected_token_exits_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let aggregator = format!("{}/api/cluster/snapshot", server.uri());
    let mut cmd = clustersync_cmd();
    cmd.args([
        "--aggregator",
        aggregator.as_str(),
        "--cluster",
        "https://pve-01:8006",
        "--token",
        "expired",
        "snapshot",
    ]);

    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
