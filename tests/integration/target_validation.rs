//! Target address validation happens before any connection attempt, so
//! these run without network access and must fail fast.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn bridgectl() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bridgectl"));
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_install_rejects_host_with_whitespace() {
    bridgectl()
        .args(["install", "go2 local"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid target"));
}

#[test]
fn test_install_rejects_host_with_embedded_port() {
    bridgectl()
        .args(["install", "go2.local:22"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid target"));
}

#[test]
fn test_install_rejects_double_at_sign() {
    bridgectl()
        .args(["install", "a@b@c"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid target"));
}

#[test]
fn test_setup_rejects_decorated_robot_address() {
    bridgectl()
        .args(["setup", "unitree@192.168.123.18"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid robot address"));
}

#[test]
fn test_setup_rejects_address_with_port() {
    bridgectl()
        .args(["setup", "192.168.123.18:7447"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid robot address"));
}

#[test]
fn test_status_rejects_malformed_target() {
    bridgectl()
        .args(["status", "user@"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid target"));
}
