//! CLI surface tests: help, version, argument validation, exit codes.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn bridgectl() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bridgectl"));
    cmd.env("NO_COLOR", "1");
    cmd
}

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_one() {
    bridgectl()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage:"))
        .stderr(predicate::str::contains("install"));
}

#[test]
fn test_cli_help_flag_exits_zero() {
    bridgectl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_cli_version_flag_exits_zero() {
    bridgectl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bridgectl"));
}

#[test]
fn test_install_help_documents_its_flags() {
    bridgectl()
        .args(["install", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ROBOT_HOST"))
        .stdout(predicate::str::contains("--test"))
        .stdout(predicate::str::contains("--no-start"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_setup_help_documents_its_flags() {
    bridgectl()
        .args(["setup", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ROBOT_IP"))
        .stdout(predicate::str::contains("--tailscale"));
}

// --- Argument errors exit 1 ---

#[test]
fn test_install_without_host_exits_one() {
    bridgectl()
        .arg("install")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ROBOT_HOST"));
}

#[test]
fn test_unknown_flag_exits_one() {
    bridgectl()
        .args(["install", "go2.local", "--frobnicate"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_subcommand_exits_one() {
    bridgectl().arg("teleport").assert().code(1);
}

#[test]
fn test_install_test_mode_conflicts_with_force() {
    bridgectl()
        .args(["install", "go2.local", "--test", "--force"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_install_test_mode_conflicts_with_no_start() {
    bridgectl()
        .args(["install", "go2.local", "--test", "--no-start"])
        .assert()
        .code(1);
}

#[test]
fn test_setup_test_mode_conflicts_with_force() {
    bridgectl()
        .args(["setup", "192.168.123.18", "--test", "--force"])
        .assert()
        .code(1);
}
