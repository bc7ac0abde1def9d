//! Install command — provision the robot end of the bridge over SSH.
//!
//! One pass over the pipeline: probe, decide, then only the work the probe
//! showed to be missing. Re-running against a healthy robot changes nothing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::bridge;
use crate::exec::Executor;
use crate::fetch;
use crate::output::{OutputContext, ProgressReporter, TerminalReporter, progress};
use crate::plan::{self, InstallAction, InstallationState, Phase};
use crate::platform::Platform;
use crate::service;
use crate::settings::Settings;
use crate::ssh::{SshSession, SshTarget};
use crate::verify::{self, NetProbe, UreqProbe};

/// Where the release archive lands on the robot before extraction.
const ROBOT_DOWNLOAD_DIR: &str = "/tmp";

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
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

    /// Probe and verify only; change nothing on the robot
    #[arg(short = 't', long, conflicts_with_all = ["no_start", "force"])]
    pub test: bool,

    /// Install and register but leave the service stopped
    #[arg(long)]
    pub no_start: bool,

    /// Reinstall even when the robot already has the bridge
    #[arg(long)]
    pub force: bool,
}

/// Entry point for `bridgectl install`.
///
/// # Errors
///
/// Returns an error when the robot is unreachable, a pipeline step fails,
/// or a `--test` battery has failures.
pub async fn run(ctx: &OutputContext, args: &InstallArgs) -> Result<()> {
    let settings = Settings::new();
    let target = SshTarget::parse(&args.robot_host, args.user.as_deref(), args.port)?;
    let host = target.host.clone();

    ctx.header(&format!("zenoh-bridge-dds on {target}"));

    let mut session = SshSession::acquire(target, args.key.clone(), &settings).await?;
    let result = run_pipeline(&session, &UreqProbe, ctx, &settings, &host, args).await;
    session.release().await;
    result
}

/// The whole install flow against an already-acquired channel. Generic over
/// the executor and probe so the flow is testable end to end.
async fn run_pipeline(
    exec: &impl Executor,
    probe: &impl NetProbe,
    ctx: &OutputContext,
    settings: &Settings,
    host: &str,
    args: &InstallArgs,
) -> Result<()> {
    let state = plan::inspect_robot(exec, settings).await?;
    ctx.kv("state", &plan::phase(&state).to_string());
    if let Some(version) = &state.version {
        ctx.kv("version", version);
    }

    if args.test {
        let report = verify::run_checks_with_service(exec, probe, settings, host).await;
        super::print_report(ctx, &report);
        if !report.all_passed() {
            return Err(report.to_failure().into());
        }
        return Ok(());
    }

    match plan::decide(&state, args.force) {
        InstallAction::Skip => {
            report_existing(ctx, &state, settings);
            if !state.service.is_active() {
                if args.no_start {
                    ctx.info("service left stopped (--no-start)");
                    return Ok(());
                }
                start_service(exec, ctx, settings).await?;
            }
        }
        action @ (InstallAction::Reinstall | InstallAction::FreshInstall) => {
            if action == InstallAction::Reinstall {
                ctx.info("reinstalling over the existing installation (--force)");
            }
            let stop_running = action == InstallAction::Reinstall && state.service.is_active();
            let reporter = TerminalReporter::new(ctx);
            install(exec, ctx, &reporter, settings, stop_running).await?;
            if args.no_start {
                ctx.info("service registered but left stopped (--no-start); start it with:");
                ctx.hint(&format!("sudo systemctl start {}", settings.service_name));
                return Ok(());
            }
            start_service(exec, ctx, settings).await?;
        }
    }

    let report = verify::run_checks_with_service(exec, probe, settings, host).await;
    super::print_report(ctx, &report);
    if report.all_passed() {
        ctx.success("bridge verified");
    } else {
        ctx.warn(&format!(
            "{} of {} verification checks failed; re-probe with:",
            report.failed(),
            report.checks.len()
        ));
        ctx.hint(&format!("bridgectl install {host} --test"));
    }
    Ok(())
}

fn report_existing(ctx: &OutputContext, state: &InstallationState, settings: &Settings) {
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

/// Download, extract, configure, and register. Each step carries the phase
/// it was working toward, so failures read `failed at phase INSTALLING`.
async fn install(
    exec: &impl Executor,
    ctx: &OutputContext,
    reporter: &impl ProgressReporter,
    settings: &Settings,
    stop_running: bool,
) -> Result<()> {
    service::ensure_sudo(exec)
        .await
        .with_context(|| Phase::Installing.failure())?;
    let platform = Platform::detect(exec)
        .await
        .with_context(|| Phase::Installing.failure())?;
    if platform != Platform::ROBOT {
        ctx.warn(&format!("robot reports {platform}, expected {}", Platform::ROBOT));
    }

    let triple = platform.triple();
    let archive = fetch::fetch(exec, settings, triple, ROBOT_DOWNLOAD_DIR, true, reporter)
        .await
        .with_context(|| Phase::Installing.failure())?;
    if stop_running {
        // a live binary cannot be overwritten by the extraction
        reporter.step("stopping the running service");
        service::stop(exec, settings)
            .await
            .with_context(|| Phase::Installing.failure())?;
    }
    fetch::install_archive(
        exec,
        settings,
        triple,
        &archive,
        &settings.robot_install_dir,
        true,
        Some(&settings.robot_bin_link),
    )
    .await
    .with_context(|| Phase::Installing.failure())?;
    reporter.success(&format!("binary installed at {}", settings.robot_bin_path()));

    bridge::deploy_robot(exec, settings, reporter)
        .await
        .with_context(|| Phase::Configured.failure())?;

    service::register(exec, settings)
        .await
        .with_context(|| Phase::Registered.failure())?;
    reporter.success(&format!("systemd unit {} registered", settings.service_name));
    Ok(())
}

async fn start_service(
    exec: &impl Executor,
    ctx: &OutputContext,
    settings: &Settings,
) -> Result<()> {
    let spinner = ctx
        .show_progress()
        .then(|| progress::spinner(&format!("starting {}", settings.service_name)));
    match service::start_and_wait(exec, settings).await {
        Ok(state) => {
            let msg = format!("service {} is {state}", settings.service_name);
            match &spinner {
                Some(pb) => progress::finish_ok(pb, &msg),
                None => ctx.success(&msg),
            }
            Ok(())
        }
        Err(e) => {
            if let Some(pb) = &spinner {
                progress::finish_fail(pb, &format!("service {} did not start", settings.service_name));
            }
            Err(e).with_context(|| Phase::Active.failure())
        }
    }
}
