//! Installer, configurator, and verifier for the Zenoh DDS bridge pair
//! running between a Go2 robot and a workstation.
//!
//! The binary in `main.rs` is a thin wrapper; everything lives here so
//! integration tests can drive the same code paths directly.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod output;
pub mod plan;
pub mod platform;
pub mod runner;
pub mod service;
pub mod settings;
pub mod ssh;
pub mod verify;
