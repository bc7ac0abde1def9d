//! Installation probing and the install-or-skip decision.
//!
//! State is recomputed from the live target on every run and never cached,
//! so a run that died halfway leaves nothing stale behind: the next
//! invocation probes again and converges.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::exec::Executor;
use crate::service::{self, ServiceState};
use crate::settings::{BRIDGE_BINARY, CONFIG_FILE, LAUNCHER_FILE, MANIFEST_FILE, Settings};

/// Pipeline phases, in traversal order. Failures name the phase they
/// occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninstalled,
    Installing,
    Configured,
    Registered,
    Active,
    Verified,
}

impl Phase {
    /// Context line attached to errors raised inside this phase.
    #[must_use]
    pub fn failure(self) -> String {
        format!("failed at phase {self}")
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninstalled => "UNINSTALLED",
            Self::Installing => "INSTALLING",
            Self::Configured => "CONFIGURED",
            Self::Registered => "REGISTERED",
            Self::Active => "ACTIVE",
            Self::Verified => "VERIFIED",
        };
        write!(f, "{s}")
    }
}

/// What this run will do to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    /// Installed and not forced: leave the installation alone.
    Skip,
    /// Installed but forced: overwrite in place.
    Reinstall,
    /// Not (fully) installed: run the whole pipeline.
    FreshInstall,
}

/// Install manifest written next to the binary at install time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub triple: String,
    pub installed_at: String,
}

/// Freshly probed installation signals for one target.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationState {
    /// The bridge binary is in place.
    pub binary_present: bool,
    /// The supervision artifacts are in place (robot: systemd unit;
    /// workstation: launcher and config).
    pub service_registered: bool,
    /// Current service activity (workstation probes report `unknown`).
    pub service: ServiceState,
    /// Version recorded in the install manifest, if readable.
    pub version: Option<String>,
}

impl InstallationState {
    /// Installed means both signals hold. A half-completed install (either
    /// signal alone) counts as not installed and gets a fresh install.
    #[must_use]
    pub fn installed(&self) -> bool {
        self.binary_present && self.service_registered
    }
}

/// Pure decision over the probed state.
#[must_use]
pub fn decide(state: &InstallationState, force: bool) -> InstallAction {
    match (state.installed(), force) {
        (true, false) => InstallAction::Skip,
        (true, true) => InstallAction::Reinstall,
        (false, _) => InstallAction::FreshInstall,
    }
}

/// Phase the target is observably in before anything is changed. A probe
/// cannot distinguish CONFIGURED from REGISTERED, and VERIFIED only exists
/// as the outcome of a check battery, so neither is ever reported here.
#[must_use]
pub fn phase(state: &InstallationState) -> Phase {
    match (state.binary_present, state.service_registered) {
        (false, false) => Phase::Uninstalled,
        (true, false) | (false, true) => Phase::Installing,
        (true, true) if state.service.is_active() => Phase::Active,
        (true, true) => Phase::Registered,
    }
}

/// Probe the robot over the session. Read-only.
///
/// # Errors
///
/// Returns an error on transport loss; absent files are state, not errors.
pub async fn inspect_robot(
    exec: &impl Executor,
    settings: &Settings,
) -> Result<InstallationState> {
    let binary_present = exec.path_exists(&settings.robot_bin_path()).await?;
    let service_registered = exec.path_exists(&settings.unit_path()).await?;
    let service = service::status(exec, settings).await?;
    let version = read_manifest(exec, &settings.robot_install_dir)
        .await
        .map(|m| m.version);
    Ok(InstallationState {
        binary_present,
        service_registered,
        service,
        version,
    })
}

/// Probe the workstation installation under `install_dir`. Read-only.
///
/// # Errors
///
/// Returns an error only if the local executor itself fails.
pub async fn inspect_workstation(
    exec: &impl Executor,
    install_dir: &str,
) -> Result<InstallationState> {
    let binary_present = exec
        .path_exists(&format!("{install_dir}/{BRIDGE_BINARY}"))
        .await?;
    let launcher = exec
        .path_exists(&format!("{install_dir}/{LAUNCHER_FILE}"))
        .await?;
    let config = exec
        .path_exists(&format!("{install_dir}/{CONFIG_FILE}"))
        .await?;
    let version = read_manifest(exec, install_dir).await.map(|m| m.version);
    Ok(InstallationState {
        binary_present,
        service_registered: launcher && config,
        service: ServiceState::Unknown,
        version,
    })
}

/// Best-effort manifest read; unreadable or unparsable manifests yield
/// `None` rather than failing the probe.
async fn read_manifest(exec: &impl Executor, install_dir: &str) -> Option<Manifest> {
    let output = exec
        .run(&format!("cat '{install_dir}/{MANIFEST_FILE}'"))
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}
