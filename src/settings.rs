//! Run-wide settings: one immutable value built at startup and passed
//! explicitly into every component. Nothing below this module reads the
//! environment or global state to find a port or a path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Name of the bridge executable inside the release archive.
pub const BRIDGE_BINARY: &str = "zenoh-bridge-dds";

/// Synthesized configuration file name (JSON5; rendered as JSON).
pub const CONFIG_FILE: &str = "config.json5";

/// Synthesized launcher script name.
pub const LAUNCHER_FILE: &str = "start-bridge.sh";

/// Synthesized health probe script name.
pub const HEALTHCHECK_FILE: &str = "check-bridge.sh";

/// Install manifest written next to the binary; read back by the planner.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Which side of the bridge pair a run is provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Robot,
    Workstation,
}

/// Immutable per-run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Pinned bridge release version.
    pub bridge_version: String,
    /// Zenoh peer port, identical on both hosts.
    pub bridge_port: u16,
    /// REST admin port on the robot.
    pub robot_rest_port: u16,
    /// REST admin port on the workstation.
    pub workstation_rest_port: u16,
    /// DDS domain id, identical on both hosts.
    pub dds_domain: u32,
    /// DDS scope prefix, identical on both hosts.
    pub scope: String,
    /// systemd unit name on the robot (without the `.service` suffix).
    pub service_name: String,
    /// Install directory on the robot.
    pub robot_install_dir: String,
    /// Stable symlink to the robot binary.
    pub robot_bin_link: String,
    /// Well-known robot topics the verifier checks for.
    pub topics: Vec<String>,
    /// SSH connection establishment timeout.
    pub connect_timeout: Duration,
    /// Default timeout for a single remote or local command.
    pub command_timeout: Duration,
    /// Timeout for the archive download.
    pub download_timeout: Duration,
    /// Per-check timeout in the verification battery.
    pub check_timeout: Duration,
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bridge_version: "0.5.0-beta.9".to_string(),
            bridge_port: 7447,
            robot_rest_port: 8000,
            workstation_rest_port: 8001,
            dds_domain: 0,
            scope: "go2".to_string(),
            service_name: "zenoh-bridge".to_string(),
            robot_install_dir: "/opt/zenoh-bridge".to_string(),
            robot_bin_link: "/usr/local/bin/zenoh-bridge-dds".to_string(),
            topics: vec![
                "rt/lowstate".to_string(),
                "rt/sportmodestate".to_string(),
                "rt/servicestate".to_string(),
            ],
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(300),
            check_timeout: Duration::from_secs(5),
        }
    }

    /// Absolute path of the bridge binary on the robot.
    #[must_use]
    pub fn robot_bin_path(&self) -> String {
        format!("{}/{BRIDGE_BINARY}", self.robot_install_dir)
    }

    /// Absolute path of the systemd unit file on the robot.
    #[must_use]
    pub fn unit_path(&self) -> String {
        format!("/etc/systemd/system/{}.service", self.service_name)
    }

    /// REST admin port for the given role.
    #[must_use]
    pub fn rest_port(&self, role: Role) -> u16 {
        match role {
            Role::Robot => self.robot_rest_port,
            Role::Workstation => self.workstation_rest_port,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Install directory on the workstation (`~/.zenoh-bridge`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn workstation_install_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".zenoh-bridge"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_fixed() {
        let s = Settings::new();
        assert_eq!(s.bridge_port, 7447);
        assert_eq!(s.rest_port(Role::Robot), 8000);
        assert_eq!(s.rest_port(Role::Workstation), 8001);
    }

    #[test]
    fn robot_paths_derive_from_install_dir() {
        let s = Settings::new();
        assert_eq!(s.robot_bin_path(), "/opt/zenoh-bridge/zenoh-bridge-dds");
        assert_eq!(s.unit_path(), "/etc/systemd/system/zenoh-bridge.service");
    }

    #[test]
    fn verifier_topics_cover_robot_state() {
        let s = Settings::new();
        assert_eq!(
            s.topics,
            ["rt/lowstate", "rt/sportmodestate", "rt/servicestate"]
        );
    }
}
