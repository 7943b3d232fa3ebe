//! CLI argument parsing tests for BenchPilot

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

fn benchpilot() -> Command {
    Command::new(env!("CARGO_BIN_EXE_benchpilot"))
}

#[test]
fn test_help_flag() {
    benchpilot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("measurement assistant"))
        .stdout(predicate::str::contains("measure"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_version_flag() {
    benchpilot()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_usage() {
    benchpilot()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_subcommand() {
    benchpilot()
        .arg("calibrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ============================================================================
// Subcommand help
// ============================================================================

#[test]
fn test_init_help() {
    benchpilot()
        .args(["init", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialize"));
}

#[test]
fn test_measure_help_lists_flags() {
    benchpilot()
        .args(["measure", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--message"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_measure_rejects_missing_message_value() {
    benchpilot()
        .args(["measure", "-m"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a value is required"));
}

#[test]
fn test_tools_help() {
    benchpilot()
        .args(["tools", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("List the bench tools"));
}

#[test]
fn test_status_rejects_extra_args() {
    benchpilot()
        .args(["status", "--all"])
        .assert()
        .failure();
}
