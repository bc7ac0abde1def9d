//! Setup command — provision the workstation end of the bridge.
//!
//! Same probe-decide-act shape as the robot install, but everything runs on
//! the local host, without systemd and without privilege. The synthesized
//! configuration is refreshed on every run, so pointing an existing setup at
//! a different robot is just a re-run.

use anyhow::{Context, Result};
use clap::Args;

use crate::bridge;
use crate::exec::{Executor, LocalExecutor, stderr_line};
use crate::fetch;
use crate::output::{OutputContext, ProgressReporter, TerminalReporter};
use crate::plan::{self, InstallAction, Phase};
use crate::platform::Platform;
use crate::settings::{self, LAUNCHER_FILE, Role, Settings};
use crate::ssh::parse_address;
use crate::verify::{self, NetProbe, UreqProbe};

/// Arguments for the setup command.
#[derive(Args)]
pub struct SetupArgs {
    /// Robot address the local bridge will connect to
    #[arg(value_name = "ROBOT_IP")]
    pub robot_ip: String,

    /// Advertise the Tailscale address instead of the LAN route
    #[arg(long)]
    pub tailscale: bool,

    /// Reinstall even when the bridge is already present
    #[arg(long)]
    pub force: bool,

    /// Probe the robot bridge and verify; change nothing locally
    #[arg(long, conflicts_with = "force")]
    pub test: bool,
}

/// Entry point for `bridgectl setup`.
///
/// # Errors
///
/// Returns an error when the address is malformed, the local platform is
/// unsupported, a pipeline step fails, or a `--test` battery has failures.
pub async fn run(ctx: &OutputContext, args: &SetupArgs) -> Result<()> {
    let settings = Settings::new();
    let install_dir = settings::workstation_install_dir()?;
    let exec = LocalExecutor::new(settings.command_timeout);

    ctx.header("zenoh-bridge-dds workstation setup");

    run_setup(
        &exec,
        &UreqProbe,
        ctx,
        &settings,
        &install_dir.display().to_string(),
        args,
    )
    .await
}

async fn run_setup(
    exec: &impl Executor,
    probe: &impl NetProbe,
    ctx: &OutputContext,
    settings: &Settings,
    install_dir: &str,
    args: &SetupArgs,
) -> Result<()> {
    let robot_addr = parse_address(&args.robot_ip)?;

    if args.test {
        let report = robot_battery(probe, settings, &robot_addr).await;
        super::print_report(ctx, &report);
        if !report.all_passed() {
            return Err(report.to_failure().into());
        }
        return Ok(());
    }

    // resolve the platform before anything touches the network
    let platform = Platform::detect(exec).await?;
    ctx.kv("platform", &platform.to_string());

    let state = plan::inspect_workstation(exec, install_dir).await?;
    ctx.kv("state", &plan::phase(&state).to_string());

    let reporter = TerminalReporter::new(ctx);
    match plan::decide(&state, args.force) {
        InstallAction::Skip => {
            let installed = state.version.as_deref().unwrap_or("unknown version");
            ctx.success(&format!("bridge already installed ({installed})"));
            if let Some(version) = &state.version
                && version != &settings.bridge_version
            {
                ctx.warn(&format!(
                    "installed {version} differs from pinned {}; reinstall with --force",
                    settings.bridge_version
                ));
            }
        }
        action @ (InstallAction::Reinstall | InstallAction::FreshInstall) => {
            if action == InstallAction::Reinstall {
                ctx.info("reinstalling over the existing installation (--force)");
            }
            let triple = platform.triple();
            let download_dir = std::env::temp_dir().display().to_string();
            let archive = fetch::fetch(exec, settings, triple, &download_dir, false, &reporter)
                .await
                .with_context(|| Phase::Installing.failure())?;
            fetch::install_archive(exec, settings, triple, &archive, install_dir, false, None)
                .await
                .with_context(|| Phase::Installing.failure())?;
            reporter.success(&format!("binary installed at {install_dir}"));
        }
    }

    let own_addr = own_address(exec, settings, &robot_addr, args.tailscale)
        .await
        .with_context(|| Phase::Configured.failure())?;
    ctx.kv("own address", &own_addr);
    bridge::deploy_workstation(exec, settings, install_dir, &robot_addr, &own_addr, &reporter)
        .await
        .with_context(|| Phase::Configured.failure())?;

    let report = robot_battery(probe, settings, &robot_addr).await;
    super::print_report(ctx, &report);
    if report.all_passed() {
        ctx.success("robot bridge reachable");
    } else {
        ctx.warn("robot bridge not fully reachable; provision the robot first with:");
        ctx.hint(&format!("bridgectl install {robot_addr}"));
    }
    ctx.info("start the local bridge with:");
    ctx.hint(&format!("{install_dir}/{LAUNCHER_FILE}"));
    Ok(())
}

/// The workstation has no robot-side shell, so its battery is the network
/// checks against the robot's REST port.
async fn robot_battery(
    probe: &impl NetProbe,
    settings: &Settings,
    robot_addr: &str,
) -> verify::VerificationReport {
    verify::run_checks(probe, settings, robot_addr, settings.rest_port(Role::Robot)).await
}

/// Address the local bridge should advertise. The default route is read off
/// a connected UDP socket without sending a packet; `--tailscale` asks the
/// tailscale CLI instead.
async fn own_address(
    exec: &impl Executor,
    settings: &Settings,
    robot_addr: &str,
    tailscale: bool,
) -> Result<String> {
    if tailscale {
        let output = exec.run("tailscale ip -4").await?;
        if !output.status.success() {
            anyhow::bail!("tailscale ip -4 failed: {}", stderr_line(&output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let addr = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .context("tailscale returned no address")?;
        return Ok(addr.to_string());
    }

    let robot = robot_addr.to_string();
    let port = settings.bridge_port;
    tokio::task::spawn_blocking(move || {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").context("binding probe socket")?;
        socket
            .connect((robot.as_str(), port))
            .with_context(|| format!("no route to {robot}"))?;
        let local = socket.local_addr().context("reading probe socket address")?;
        Ok(local.ip().to_string())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))?
}
