//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, each subcommand
//! responds to `--help`, and the offline subcommands produce their output.

#![allow(deprecated)] // cargo_bin deprecation: replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `fixembed` binary.
fn fixembed() -> Command {
    Command::cargo_bin("fixembed").expect("binary 'fixembed' should be built")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    fixembed()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: fixembed"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("platforms"));
}

#[test]
fn version_flag_shows_semver() {
    fixembed()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^fixembed \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_args_shows_error_and_usage() {
    fixembed()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: fixembed"));
}

#[test]
fn invalid_subcommand_fails() {
    fixembed()
        .arg("this-is-not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn serve_help() {
    fixembed()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run the HTTP relay"))
        .stdout(predicate::str::contains("--bind"));
}

#[test]
fn resolve_help() {
    fixembed()
        .args(["resolve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve one URL"))
        .stdout(predicate::str::contains("<URL>"))
        .stdout(predicate::str::contains("--pretty"));
}

#[test]
fn resolve_missing_url_fails() {
    fixembed()
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<URL>"));
}

// ─── Offline behavior ────────────────────────────────────────────────────────

#[test]
fn platforms_lists_all_eight_in_order() {
    fixembed()
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("8 platforms"))
        .stdout(predicate::str::is_match(r"(?s)twitter.*reddit.*youtube.*bluesky.*instagram.*threads.*pixiv.*bilibili").unwrap());
}

#[test]
fn resolve_unsupported_url_prints_redirect() {
    fixembed()
        .args(["resolve", "https://example.com/foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""success":false"#))
        .stdout(predicate::str::contains(r#""redirect":"https://example.com/foo""#));
}

#[test]
fn resolve_rejects_bad_timeout_env() {
    fixembed()
        .env("UPSTREAM_TIMEOUT_MS", "soon")
        .args(["resolve", "https://example.com/foo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("UPSTREAM_TIMEOUT_MS"));
}
