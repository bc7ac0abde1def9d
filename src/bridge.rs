//! Bridge configuration and companion artifact synthesis.
//!
//! Every artifact is rendered from one typed value with all parameters baked
//! in as literals, staged in a scratch directory, and delivered through the
//! executor. Nothing on the target re-derives a port or a path at runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::exec::{Executor, place_file, stderr_line, with_sudo};
use crate::output::ProgressReporter;
use crate::settings::{
    BRIDGE_BINARY, CONFIG_FILE, HEALTHCHECK_FILE, LAUNCHER_FILE, Role, Settings,
};

/// `tcp/{host}:{port}`, the endpoint form the bridge expects.
#[must_use]
pub fn tcp_endpoint(host: &str, port: u16) -> String {
    format!("tcp/{host}:{port}")
}

// ── Typed configuration ───────────────────────────────────────────────────────

/// The bridge configuration document, rendered to `config.json5`.
/// JSON is a subset of JSON5, so serializing through serde keeps the file
/// loadable while letting tests work with a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub mode: String,
    pub listen: EndpointList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<EndpointList>,
    pub plugins: Plugins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointList {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugins {
    pub dds: DdsPlugin,
    pub rest: RestPlugin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdsPlugin {
    pub domain: u32,
    pub scope: String,
    pub localhost_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestPlugin {
    pub http_port: u16,
}

impl BridgeConfig {
    /// Robot side: listen on all interfaces, REST on the robot port, DDS
    /// open to the controller's own network stack.
    #[must_use]
    pub fn robot(settings: &Settings) -> Self {
        Self {
            mode: "peer".to_string(),
            listen: EndpointList {
                endpoints: vec![tcp_endpoint("0.0.0.0", settings.bridge_port)],
            },
            connect: None,
            plugins: Plugins {
                dds: DdsPlugin {
                    domain: settings.dds_domain,
                    scope: settings.scope.clone(),
                    localhost_only: false,
                    allow: None,
                },
                rest: RestPlugin {
                    http_port: settings.rest_port(Role::Robot),
                },
            },
        }
    }

    /// Workstation side: listen locally and on the detected address, connect
    /// out to the robot's listen endpoint, DDS confined to the loopback.
    #[must_use]
    pub fn workstation(settings: &Settings, robot_addr: &str, own_addr: &str) -> Self {
        let mut endpoints = vec![tcp_endpoint("127.0.0.1", settings.bridge_port)];
        let own = tcp_endpoint(own_addr, settings.bridge_port);
        if !endpoints.contains(&own) {
            endpoints.push(own);
        }
        Self {
            mode: "peer".to_string(),
            listen: EndpointList { endpoints },
            connect: Some(EndpointList {
                endpoints: vec![tcp_endpoint(robot_addr, settings.bridge_port)],
            }),
            plugins: Plugins {
                dds: DdsPlugin {
                    domain: settings.dds_domain,
                    scope: settings.scope.clone(),
                    localhost_only: true,
                    allow: None,
                },
                rest: RestPlugin {
                    http_port: settings.rest_port(Role::Workstation),
                },
            },
        }
    }

    /// Render to the file content written as `config.json5`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self) -> Result<String> {
        let mut rendered =
            serde_json::to_string_pretty(self).context("rendering bridge config")?;
        rendered.push('\n');
        Ok(rendered)
    }
}

// ── Companion scripts ─────────────────────────────────────────────────────────

/// Launcher script with the binary and config paths baked in.
#[must_use]
pub fn launcher_script(bridge_bin: &str, config_path: &str) -> String {
    format!(
        "#!/bin/sh\n\
         # Launches the Zenoh DDS bridge with its synthesized configuration.\n\
         exec '{bridge_bin}' -c '{config_path}'\n"
    )
}

/// Health probe script checking the peer port and the REST admin endpoint,
/// both against literal values baked in at synthesis time.
#[must_use]
pub fn healthcheck_script(bridge_port: u16, rest_port: u16) -> String {
    format!(
        "#!/bin/sh\n\
         # Probes the running bridge: peer port and REST admin endpoint.\n\
         status=0\n\
         if nc -z -w 2 127.0.0.1 {bridge_port}; then\n\
         \x20   echo 'ok: peer port {bridge_port} is listening'\n\
         else\n\
         \x20   echo 'fail: peer port {bridge_port} is not listening'\n\
         \x20   status=1\n\
         fi\n\
         if curl -fsS -m 5 -o /dev/null 'http://127.0.0.1:{rest_port}/@/local/router'; then\n\
         \x20   echo 'ok: REST admin on port {rest_port} responds'\n\
         else\n\
         \x20   echo 'fail: REST admin on port {rest_port} does not respond'\n\
         \x20   status=1\n\
         fi\n\
         exit $status\n"
    )
}

// ── Delivery ──────────────────────────────────────────────────────────────────

/// Synthesize and place the robot's config, launcher, and health probe.
///
/// # Errors
///
/// Returns an error when rendering, staging, or placement fails.
pub async fn deploy_robot(
    exec: &impl Executor,
    settings: &Settings,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let dir = &settings.robot_install_dir;
    let config = BridgeConfig::robot(settings).render()?;
    let launcher = launcher_script(&settings.robot_bin_path(), &format!("{dir}/{CONFIG_FILE}"));
    let health = healthcheck_script(settings.bridge_port, settings.rest_port(Role::Robot));

    deploy(exec, dir, true, &config, &launcher, &health).await?;
    reporter.success(&format!("bridge configuration written to {dir}/{CONFIG_FILE}"));
    Ok(())
}

/// Synthesize and place the workstation's config, launcher, and health
/// probe under `install_dir`.
///
/// # Errors
///
/// Returns an error when rendering, staging, or placement fails.
pub async fn deploy_workstation(
    exec: &impl Executor,
    settings: &Settings,
    install_dir: &str,
    robot_addr: &str,
    own_addr: &str,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let config = BridgeConfig::workstation(settings, robot_addr, own_addr).render()?;
    let launcher = launcher_script(
        &format!("{install_dir}/{BRIDGE_BINARY}"),
        &format!("{install_dir}/{CONFIG_FILE}"),
    );
    let health = healthcheck_script(settings.bridge_port, settings.rest_port(Role::Workstation));

    deploy(exec, install_dir, false, &config, &launcher, &health).await?;
    reporter.success(&format!(
        "bridge configuration written to {install_dir}/{CONFIG_FILE}"
    ));
    Ok(())
}

async fn deploy(
    exec: &impl Executor,
    install_dir: &str,
    sudo: bool,
    config: &str,
    launcher: &str,
    health: &str,
) -> Result<()> {
    let mkdir = exec
        .run(&with_sudo(sudo, &format!("mkdir -p '{install_dir}'")))
        .await?;
    if !mkdir.status.success() {
        anyhow::bail!(
            "creating {install_dir} on {} failed: {}",
            exec.label(),
            stderr_line(&mkdir)
        );
    }

    let staging = tempfile::tempdir().context("creating staging directory")?;
    let artifacts = [
        (CONFIG_FILE, config, "0644"),
        (LAUNCHER_FILE, launcher, "0755"),
        (HEALTHCHECK_FILE, health, "0755"),
    ];
    for (name, contents, mode) in artifacts {
        let local = staging.path().join(name);
        tokio::fs::write(&local, contents)
            .await
            .with_context(|| format!("writing {name}"))?;
        place_file(exec, &local, &format!("{install_dir}/{name}"), mode, sudo).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::exec::test_support::FakeExecutor;

    struct Silent;
    impl ProgressReporter for Silent {
        fn step(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warn(&self, _: &str) {}
    }

    #[test]
    fn pair_shares_domain_and_scope() {
        let settings = Settings::new();
        let robot = BridgeConfig::robot(&settings);
        let ws = BridgeConfig::workstation(&settings, "192.168.123.18", "192.168.123.99");
        assert_eq!(robot.plugins.dds.domain, ws.plugins.dds.domain);
        assert_eq!(robot.plugins.dds.scope, ws.plugins.dds.scope);
    }

    #[test]
    fn workstation_connects_to_the_robot_listen_endpoint() {
        let settings = Settings::new();
        let robot = BridgeConfig::robot(&settings);
        let ws = BridgeConfig::workstation(&settings, "192.168.123.18", "192.168.123.99");

        assert_eq!(robot.listen.endpoints, ["tcp/0.0.0.0:7447"]);
        let connect = ws.connect.unwrap();
        assert_eq!(connect.endpoints, ["tcp/192.168.123.18:7447"]);
        // same port on both sides of the pair
        assert!(connect.endpoints[0].ends_with(":7447"));
        assert!(robot.listen.endpoints[0].ends_with(":7447"));
    }

    #[test]
    fn roles_get_distinct_rest_ports_and_exposure() {
        let settings = Settings::new();
        let robot = BridgeConfig::robot(&settings);
        let ws = BridgeConfig::workstation(&settings, "192.168.123.18", "192.168.123.99");

        assert_eq!(robot.plugins.rest.http_port, 8000);
        assert_eq!(ws.plugins.rest.http_port, 8001);
        assert!(!robot.plugins.dds.localhost_only);
        assert!(ws.plugins.dds.localhost_only);
        assert!(robot.connect.is_none());
    }

    #[test]
    fn workstation_listens_locally_and_on_its_own_address() {
        let settings = Settings::new();
        let ws = BridgeConfig::workstation(&settings, "192.168.123.18", "100.74.2.11");
        assert_eq!(
            ws.listen.endpoints,
            ["tcp/127.0.0.1:7447", "tcp/100.74.2.11:7447"]
        );
    }

    #[test]
    fn loopback_own_address_is_not_duplicated() {
        let settings = Settings::new();
        let ws = BridgeConfig::workstation(&settings, "192.168.123.18", "127.0.0.1");
        assert_eq!(ws.listen.endpoints, ["tcp/127.0.0.1:7447"]);
    }

    #[test]
    fn rendered_config_is_valid_json_and_round_trips() {
        let settings = Settings::new();
        let config = BridgeConfig::robot(&settings);
        let rendered = config.render().unwrap();
        let parsed: BridgeConfig = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
        assert!(rendered.contains("\"mode\": \"peer\""));
        // absent connect section is omitted, not null
        assert!(!rendered.contains("\"connect\""));
    }

    #[test]
    fn launcher_bakes_in_literal_paths() {
        let script = launcher_script(
            "/opt/zenoh-bridge/zenoh-bridge-dds",
            "/opt/zenoh-bridge/config.json5",
        );
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec '/opt/zenoh-bridge/zenoh-bridge-dds' -c '/opt/zenoh-bridge/config.json5'"));
        assert!(!script.contains("$("));
        assert!(!script.contains("${"));
    }

    #[test]
    fn healthcheck_bakes_in_literal_ports() {
        let script = healthcheck_script(7447, 8000);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("127.0.0.1 7447"));
        assert!(script.contains("http://127.0.0.1:8000/@/local/router"));
        assert!(!script.contains("$("));
        assert!(!script.contains("${"));
    }

    #[tokio::test]
    async fn deploy_robot_places_all_three_artifacts_with_sudo() {
        let exec = FakeExecutor::new();
        deploy_robot(&exec, &Settings::new(), &Silent).await.unwrap();

        let ran = exec.ran();
        for (name, mode) in [
            ("config.json5", "0644"),
            ("start-bridge.sh", "0755"),
            ("check-bridge.sh", "0755"),
        ] {
            assert!(
                ran.iter().any(|c| c.contains(&format!(
                    "sudo install -m {mode} '/tmp/bridgectl-stage/{name}' '/opt/zenoh-bridge/{name}'"
                ))),
                "missing placement of {name}"
            );
        }

        let sent = exec.sent_files();
        let config = sent
            .iter()
            .find(|s| s.remote.ends_with("config.json5"))
            .unwrap();
        let parsed: BridgeConfig = serde_json::from_slice(&config.contents).unwrap();
        assert_eq!(parsed, BridgeConfig::robot(&Settings::new()));
    }

    #[tokio::test]
    async fn deploy_workstation_never_elevates() {
        let exec = FakeExecutor::new();
        deploy_workstation(
            &exec,
            &Settings::new(),
            "/home/op/.zenoh-bridge",
            "192.168.123.18",
            "192.168.123.99",
            &Silent,
        )
        .await
        .unwrap();
        assert_eq!(exec.ran_matching("sudo"), 0);
        assert_eq!(exec.sent_files().len(), 3);
    }
}
