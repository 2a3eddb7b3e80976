//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, validates its
//! arguments, and runs each subcommand against a temporary config.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};

const FIXTURE: &str = env!("CARGO_BIN_EXE_vidbridge-fixture");

/// Helper: get a Command for the `vidbridge` binary.
fn vidbridge() -> Command {
    Command::cargo_bin("vidbridge").expect("binary 'vidbridge' should be built")
}

/// Helper: write `config` (and any catalogs) to a fresh directory.
fn write_config(name: &str, config: &Value) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vidbridge-cli-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("backends.json");
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

fn fixture_backend(name: &str, id: &str, enabled: bool) -> Value {
    let dir = std::env::temp_dir().join(format!("vidbridge-cli-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let catalog = dir.join(format!("{id}.json"));
    std::fs::write(
        &catalog,
        json!({"videos": [
            {"videoId": "apollo-11", "title": "Apollo 11 Liftoff", "duration": 64.0}
        ]})
        .to_string(),
    )
    .unwrap();
    json!({
        "id": id,
        "name": format!("Fixture {id}"),
        "command": FIXTURE,
        "args": [catalog.to_string_lossy()],
        "priority": 1,
        "enabled": enabled
    })
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    vidbridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: vidbridge"))
        .stdout(predicate::str::contains("backends"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("details"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn version_flag_shows_semver() {
    vidbridge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^vidbridge \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_args_shows_error_and_usage() {
    vidbridge()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: vidbridge"));
}

#[test]
fn invalid_subcommand_fails() {
    vidbridge()
        .arg("this-is-not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─── Subcommand help and argument validation ─────────────────────────────────

#[test]
fn search_help() {
    vidbridge()
        .args(["search", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<QUERY>"))
        .stdout(predicate::str::contains("--max-duration"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn download_help() {
    vidbridge()
        .args(["download", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<ID>"))
        .stdout(predicate::str::contains("--backend"))
        .stdout(predicate::str::contains("--segment"))
        .stdout(predicate::str::contains("--max-height"));
}

#[test]
fn details_missing_args_fails() {
    vidbridge()
        .arg("details")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<BACKEND>"));
}

#[test]
fn search_invalid_duration_fails() {
    vidbridge()
        .args(["search", "--max-duration", "long", "rockets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[test]
fn missing_config_file_is_reported() {
    vidbridge()
        .args(["--config", "/nonexistent/vidbridge/backends.json", "backends"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn invalid_config_names_the_field() {
    let path = write_config(
        "invalid",
        &json!({"providers": [{"id": "a", "name": "A", "command": "a", "args": [], "enabled": true}]}),
    );
    vidbridge()
        .args(["backends", "-c"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("priority required"));
}

#[test]
fn backends_lists_enabled_and_disabled() {
    let path = write_config(
        "list",
        &json!({"providers": [
            fixture_backend("list", "nasa", true),
            fixture_backend("list", "dvids", false)
        ]}),
    );
    vidbridge()
        .args(["backends", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("nasa"))
        .stdout(predicate::str::contains("dvids"))
        .stdout(predicate::str::contains("Fixture nasa"));
}

#[test]
fn backends_json_is_parseable() {
    let path = write_config("json", &json!({"providers": [fixture_backend("json", "nasa", true)]}));
    let output = vidbridge()
        .args(["backends", "--json", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["providers"][0]["id"], "nasa");
}

// ─── Running against backends ────────────────────────────────────────────────

#[test]
fn search_with_only_disabled_backends_finds_nothing() {
    let path = write_config("disabled", &json!({"providers": [fixture_backend("disabled", "nasa", false)]}));
    vidbridge()
        .args(["search", "apollo", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No results"));
}

#[test]
fn search_through_fixture_backend() {
    let path = write_config("search", &json!({"providers": [fixture_backend("search", "nasa", true)]}));
    vidbridge()
        .args(["search", "apollo", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Apollo 11 Liftoff"))
        .stdout(predicate::str::contains("from nasa"));
}

#[test]
fn details_through_fixture_backend() {
    let path = write_config("details", &json!({"providers": [fixture_backend("details", "nasa", true)]}));
    vidbridge()
        .args(["details", "nasa", "apollo-11", "--json", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"videoId\": \"apollo-11\""));
}

#[test]
fn download_through_fixture_backend() {
    let path = write_config("download", &json!({"providers": [fixture_backend("download", "nasa", true)]}));
    let target = path.with_file_name("apollo-11.mp4");
    vidbridge()
        .args(["download", "apollo-11", "--backend", "nasa", "--segment", "15", "--output"])
        .arg(&target)
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("apollo-11.mp4"));
    assert!(target.exists());
}

#[test]
fn download_from_unknown_backend_fails() {
    let path = write_config("unknown", &json!({"providers": [fixture_backend("unknown", "nasa", true)]}));
    vidbridge()
        .args(["download", "apollo-11", "--backend", "vimeo", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown or disabled backend: vimeo"))
        .stderr(predicate::str::contains("youtube, nasa"));
}
