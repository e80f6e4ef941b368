//! End-to-end CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_shows_usage() {
    Command::cargo_bin("freegames")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("discovery cycle"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--ledger"));
}

#[test]
fn test_version_prints_crate_version() {
    Command::cargo_bin("freegames")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_flag_fails() {
    Command::cargo_bin("freegames")
        .unwrap()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_missing_config_file_fails_with_context() {
    Command::cargo_bin("freegames")
        .unwrap()
        .args(["--config", "/nonexistent/options.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading options"));
}
