//! Status command — read-only probe of the robot's installation.
//!
//! Reports what is there, never changes it. An uninstalled robot is a
//! successful probe, not an error.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::exec::Executor;
use crate::output::OutputContext;
use crate::plan::{self, InstallationState};
use crate::settings::Settings;
use crate::ssh::{SshSession, SshTarget};

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Robot address, `HOST` or `USER@HOST`
    #[arg(value_name = "ROBOT_HOST")]
    pub robot_host: String,

    /// SSH port on the robot
    #[arg(short, long, default_value_t = 22)]
    pub port: u16,

    /// SSH identity file
    #[arg(short, long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// SSH user (overrides a user embedded in ROBOT_HOST)
    #[arg(short, long)]
    pub user: Option<String>,
}

/// Machine-readable probe result.
#[derive(Serialize)]
struct StatusDoc<'a> {
    target: String,
    probed_at: String,
    phase: String,
    state: &'a InstallationState,
    pinned_version: &'a str,
}

fn status_doc<'a>(
    target: &str,
    settings: &'a Settings,
    state: &'a InstallationState,
) -> StatusDoc<'a> {
    StatusDoc {
        target: target.to_string(),
        probed_at: chrono::Utc::now().to_rfc3339(),
        phase: plan::phase(state).to_string(),
        state,
        pinned_version: &settings.bridge_version,
    }
}

/// Entry point for `bridgectl status`.
///
/// # Errors
///
/// Returns an error only when the robot cannot be probed.
pub async fn run(ctx: &OutputContext, args: &StatusArgs, json: bool) -> Result<()> {
    let settings = Settings::new();
    let target = SshTarget::parse(&args.robot_host, args.user.as_deref(), args.port)?;
    let shown = target.to_string();

    let mut session = SshSession::acquire(target, args.key.clone(), &settings).await?;
    let result = report(&session, ctx, &settings, &shown, json).await;
    session.release().await;
    result
}

async fn report(
    exec: &impl Executor,
    ctx: &OutputContext,
    settings: &Settings,
    target: &str,
    json: bool,
) -> Result<()> {
    let state = plan::inspect_robot(exec, settings).await?;

    if json {
        let doc = status_doc(target, settings, &state);
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    ctx.header(&format!("bridge status on {target}"));
    ctx.kv("phase", &plan::phase(&state).to_string());
    ctx.kv("binary", if state.binary_present { "present" } else { "missing" });
    ctx.kv("unit", if state.service_registered { "registered" } else { "missing" });
    ctx.kv("service", &state.service.to_string());
    match &state.version {
        Some(version) if version == &settings.bridge_version => ctx.kv("version", version),
        Some(version) => {
            ctx.kv("version", version);
            ctx.warn(&format!("pinned version is {}", settings.bridge_version));
        }
        None => ctx.kv("version", "unknown"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::exec::test_support::{FakeExecutor, fail, ok};
    use crate::service::ServiceState;

    fn quiet() -> OutputContext {
        OutputContext::new(true, true)
    }

    #[test]
    fn json_document_carries_phase_and_signals() {
        let settings = Settings::new();
        let state = InstallationState {
            binary_present: true,
            service_registered: true,
            service: ServiceState::Inactive,
            version: Some("0.5.0-beta.9".to_string()),
        };
        let doc = status_doc("unitree@192.168.123.18:22", &settings, &state);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["target"], "unitree@192.168.123.18:22");
        assert_eq!(value["phase"], "REGISTERED");
        assert_eq!(value["state"]["binary_present"], true);
        assert_eq!(value["state"]["service"], "inactive");
        assert_eq!(value["pinned_version"], "0.5.0-beta.9");
    }

    #[tokio::test]
    async fn probe_succeeds_for_an_uninstalled_robot() {
        let exec = FakeExecutor::new()
            .respond("systemctl is-active", ok(b"inactive\n"))
            .respond("cat ", fail(1));
        report(&exec, &quiet(), &Settings::new(), "unitree@go2:22", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn probe_never_mutates() {
        let exec = FakeExecutor::new()
            .with_file("/opt/zenoh-bridge/zenoh-bridge-dds", b"\x7fELF")
            .with_file("/etc/systemd/system/zenoh-bridge.service", b"[Unit]")
            .respond("systemctl is-active", ok(b"active\n"))
            .respond("cat ", fail(1));
        report(&exec, &quiet(), &Settings::new(), "unitree@go2:22", false)
            .await
            .unwrap();

        assert_eq!(exec.ran_matching("sudo"), 0);
        assert_eq!(exec.ran_matching("rm "), 0);
        assert!(exec.sent_files().is_empty());
    }

    #[tokio::test]
    async fn dead_link_surfaces_as_an_error() {
        let exec = FakeExecutor::unreachable();
        let result = report(&exec, &quiet(), &Settings::new(), "unitree@go2:22", false).await;
        assert!(result.is_err());
    }
}
