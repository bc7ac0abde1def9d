//! systemd supervision of the bridge on the robot.
//!
//! Registration installs the unit, reloads the daemon, and enables boot-time
//! start so the bridge comes back unattended after a power cycle. All
//! mutations go through sudo; the privilege check runs first so a run fails
//! before it has changed anything.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::ServiceError;
use crate::exec::{Executor, place_file, stderr_line, with_sudo};
use crate::settings::{LAUNCHER_FILE, Settings};

/// Activity state reported by `systemctl is-active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    Unknown,
}

impl ServiceState {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Render the systemd unit with every value as a literal.
///
/// Restart policy: always restart, at most 3 starts per 60 s so a
/// crash-looping bridge backs off instead of thrashing the controller.
#[must_use]
pub fn unit_file(settings: &Settings) -> String {
    let dir = &settings.robot_install_dir;
    format!(
        "[Unit]\n\
         Description=Zenoh DDS bridge\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         StartLimitIntervalSec=60\n\
         StartLimitBurst=3\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={dir}/{LAUNCHER_FILE}\n\
         Restart=always\n\
         RestartSec=2\n\
         WorkingDirectory={dir}\n\
         NoNewPrivileges=true\n\
         ProtectSystem=strict\n\
         ProtectHome=true\n\
         ReadWritePaths={dir}\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n"
    )
}

/// Fail fast when the robot user cannot elevate without a password.
///
/// # Errors
///
/// Returns [`ServiceError::PrivilegeRequired`] when `sudo -n` is refused.
pub async fn ensure_sudo(exec: &impl Executor) -> Result<()> {
    let output = exec.run("sudo -n true").await?;
    if !output.status.success() {
        return Err(ServiceError::PrivilegeRequired.into());
    }
    Ok(())
}

/// Install the unit file, reload systemd, and enable boot-time start.
///
/// # Errors
///
/// Returns [`ServiceError::RegisterFailed`] when any registration step fails.
pub async fn register(exec: &impl Executor, settings: &Settings) -> Result<()> {
    let unit_path = settings.unit_path();
    let staging = tempfile::tempdir().context("creating staging directory")?;
    let local = staging.path().join(format!("{}.service", settings.service_name));
    tokio::fs::write(&local, unit_file(settings))
        .await
        .context("writing unit file")?;
    place_file(exec, &local, &unit_path, "0644", true).await?;

    let steps = [
        "systemctl daemon-reload".to_string(),
        format!("systemctl enable {}", settings.service_name),
    ];
    for step in &steps {
        let output = exec.run(&with_sudo(true, step)).await?;
        if !output.status.success() {
            return Err(ServiceError::RegisterFailed {
                unit: unit_path,
                detail: format!("{step}: {}", stderr_line(&output)),
            }
            .into());
        }
    }
    Ok(())
}

/// Stop the service. Needed before a reinstall overwrites the running
/// binary, which Linux refuses while the old one executes.
///
/// # Errors
///
/// Returns [`ServiceError::ControlFailed`] when the stop command fails.
pub async fn stop(exec: &impl Executor, settings: &Settings) -> Result<()> {
    let output = exec
        .run(&with_sudo(true, &format!("systemctl stop {}", settings.service_name)))
        .await?;
    if !output.status.success() {
        return Err(ServiceError::ControlFailed {
            name: settings.service_name.clone(),
            detail: stderr_line(&output),
        }
        .into());
    }
    Ok(())
}

/// Current activity state. `systemctl is-active` exits nonzero for anything
/// but `active`, so only the transport can fail here.
///
/// # Errors
///
/// Returns an error on transport loss.
pub async fn status(exec: &impl Executor, settings: &Settings) -> Result<ServiceState> {
    let output = exec
        .run(&format!("systemctl is-active {}", settings.service_name))
        .await?;
    Ok(ServiceState::parse(&String::from_utf8_lossy(&output.stdout)))
}

/// Restart the service and wait until it reports active.
///
/// # Errors
///
/// Returns [`ServiceError::ControlFailed`] when the restart command fails and
/// [`ServiceError::StartFailed`] when the service never reaches active.
pub async fn start_and_wait(exec: &impl Executor, settings: &Settings) -> Result<ServiceState> {
    let name = settings.service_name.clone();
    let output = exec
        .run(&with_sudo(true, &format!("systemctl restart {name}")))
        .await?;
    if !output.status.success() {
        return Err(ServiceError::ControlFailed {
            name,
            detail: stderr_line(&output),
        }
        .into());
    }

    let mut state = ServiceState::Unknown;
    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        state = status(exec, settings).await?;
        match state {
            ServiceState::Active => return Ok(state),
            ServiceState::Failed => break,
            ServiceState::Inactive | ServiceState::Unknown => {}
        }
    }
    Err(ServiceError::StartFailed {
        name,
        state: state.to_string(),
    }
    .into())
}
