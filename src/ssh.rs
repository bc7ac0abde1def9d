//! SSH control channel to the robot.
//!
//! One multiplexed OpenSSH master (`ControlMaster=auto`) is established per
//! run and every command and transfer rides it, so the handshake cost is paid
//! once. The control socket path is derived deterministically from
//! (user, host, port); release tears the master down and removes the socket,
//! and a `Drop` guard covers every other exit path.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::error::{ConnectivityError, FetchError, TargetError};
use crate::exec::{Executor, stderr_line};
use crate::runner::{CommandRunner, TokioCommandRunner};
use crate::settings::Settings;

/// Default SSH user on the robot.
pub const DEFAULT_SSH_USER: &str = "unitree";

// ── Target address ────────────────────────────────────────────────────────────

/// Parsed SSH destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl SshTarget {
    /// Parse `HOST` or `USER@HOST`. An explicit `--user` wins over a user
    /// embedded in the address, which wins over [`DEFAULT_SSH_USER`].
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::InvalidHost`] for empty or malformed addresses.
    pub fn parse(raw: &str, user_override: Option<&str>, port: u16) -> Result<Self, TargetError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(TargetError::InvalidHost(raw.to_string()));
        }
        let (embedded, host) = match raw.split_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, raw),
        };
        if host.is_empty() || host.contains('@') || host.contains(':') {
            return Err(TargetError::InvalidHost(raw.to_string()));
        }
        if let Some(user) = embedded
            && user.is_empty()
        {
            return Err(TargetError::InvalidHost(raw.to_string()));
        }
        let user = user_override
            .or(embedded)
            .unwrap_or(DEFAULT_SSH_USER)
            .to_string();
        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    /// `user@host`, the form ssh and scp expect.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Validate a bare robot address (no user, no port) for the workstation run.
///
/// # Errors
///
/// Returns [`TargetError::InvalidAddress`] for empty or decorated addresses.
pub fn parse_address(raw: &str) -> Result<String, TargetError> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.contains('@')
        || raw.contains(':')
        || raw.chars().any(char::is_whitespace)
    {
        return Err(TargetError::InvalidAddress(raw.to_string()));
    }
    Ok(raw.to_string())
}

// ── Control channel ───────────────────────────────────────────────────────────

/// Control socket path for a target. Deterministic so a re-run of the tool
/// finds and reuses a still-live master for the same destination.
#[must_use]
pub fn control_path_for(target: &SshTarget) -> PathBuf {
    std::env::temp_dir().join(format!(
        "bridgectl-{}-{}-{}.ctl",
        target.user, target.host, target.port
    ))
}

/// Arguments shared by every ssh/scp invocation of one session.
fn base_args(control_path: &Path, key: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
    ];
    if let Some(key) = key {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args
}

/// Arguments establishing the multiplexing master.
fn master_args(
    target: &SshTarget,
    control_path: &Path,
    key: Option<&Path>,
    connect_timeout: Duration,
) -> Vec<String> {
    let mut args = base_args(control_path, key);
    args.extend([
        "-o".to_string(),
        "ControlMaster=auto".to_string(),
        "-o".to_string(),
        "ControlPersist=600".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs()),
        "-p".to_string(),
        target.port.to_string(),
        target.destination(),
        "true".to_string(),
    ]);
    args
}

/// A live multiplexed channel to one robot.
pub struct SshSession {
    target: SshTarget,
    key: Option<PathBuf>,
    control_path: PathBuf,
    runner: TokioCommandRunner,
    command_timeout: Duration,
    released: bool,
}

impl SshSession {
    /// Establish (or reuse) the control channel and prove it with a no-op
    /// command. Unreachable hosts, refused auth, and handshake timeouts all
    /// surface here as [`ConnectivityError`] before any install work starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectivityError::Unreachable`] when no channel can be
    /// established.
    pub async fn acquire(
        target: SshTarget,
        key: Option<PathBuf>,
        settings: &Settings,
    ) -> Result<Self> {
        let control_path = control_path_for(&target);
        let runner = TokioCommandRunner::new(settings.command_timeout);
        let session = Self {
            target,
            key,
            control_path,
            runner,
            command_timeout: settings.command_timeout,
            released: false,
        };

        if session.control_path.exists() {
            if session.master_alive().await {
                return Ok(session);
            }
            // stale socket from an interrupted run
            let _ = std::fs::remove_file(&session.control_path);
        }

        let args = master_args(
            &session.target,
            &session.control_path,
            session.key.as_deref(),
            settings.connect_timeout,
        );
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = session
            .runner
            .run_with_timeout("ssh", &arg_refs, settings.command_timeout)
            .await
            .map_err(|e| ConnectivityError::Unreachable {
                target: session.target.to_string(),
                detail: format!("{e:#}"),
            })?;
        if !output.status.success() {
            let _ = std::fs::remove_file(&session.control_path);
            return Err(ConnectivityError::Unreachable {
                target: session.target.to_string(),
                detail: stderr_line(&output),
            }
            .into());
        }
        Ok(session)
    }

    async fn master_alive(&self) -> bool {
        let mut args = base_args(&self.control_path, self.key.as_deref());
        args.extend([
            "-O".to_string(),
            "check".to_string(),
            self.target.destination(),
        ]);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self
            .runner
            .run_with_timeout("ssh", &arg_refs, Duration::from_secs(5))
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn execute(&self, command: &str, timeout: Duration) -> Result<Output> {
        let mut args = base_args(&self.control_path, self.key.as_deref());
        args.extend([
            "-p".to_string(),
            self.target.port.to_string(),
            self.target.destination(),
            command.to_string(),
        ]);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let started = Instant::now();
        let output = match self.runner.run_with_timeout("ssh", &arg_refs, timeout).await {
            Ok(output) => output,
            Err(_) if started.elapsed() >= timeout => {
                return Err(ConnectivityError::Timeout {
                    target: self.target.to_string(),
                    command: command.to_string(),
                    seconds: timeout.as_secs(),
                }
                .into());
            }
            Err(e) => return Err(e),
        };
        // 255 is ssh's own exit code for transport and auth failures; remote
        // commands cannot produce it through this client.
        if output.status.code() == Some(255) {
            return Err(ConnectivityError::Dropped {
                target: self.target.to_string(),
                command: command.to_string(),
            }
            .into());
        }
        Ok(output)
    }

    /// Tear the master down and remove the control socket. Idempotent.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut args = base_args(&self.control_path, self.key.as_deref());
        args.extend([
            "-O".to_string(),
            "exit".to_string(),
            self.target.destination(),
        ]);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let _ = self
            .runner
            .run_with_timeout("ssh", &arg_refs, Duration::from_secs(5))
            .await;
        let _ = std::fs::remove_file(&self.control_path);
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut args = base_args(&self.control_path, self.key.as_deref());
        args.extend([
            "-O".to_string(),
            "exit".to_string(),
            self.target.destination(),
        ]);
        let _ = std::process::Command::new("ssh")
            .args(&args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        let _ = std::fs::remove_file(&self.control_path);
    }
}

impl Executor for SshSession {
    fn label(&self) -> String {
        self.target.to_string()
    }

    async fn run(&self, command: &str) -> Result<Output> {
        self.execute(command, self.command_timeout).await
    }

    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> Result<Output> {
        self.execute(command, timeout).await
    }

    async fn send(&self, local: &Path, remote: &str) -> Result<()> {
        let mut args = base_args(&self.control_path, self.key.as_deref());
        args.extend([
            "-P".to_string(),
            self.target.port.to_string(),
            local.display().to_string(),
            format!("{}:{remote}", self.target.destination()),
        ]);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_timeout("scp", &arg_refs, self.command_timeout)
            .await
            .with_context(|| format!("running scp to {}", self.target))?;
        if !output.status.success() {
            return Err(FetchError::TransferFailed {
                local: local.display().to_string(),
                remote: remote.to_string(),
                detail: stderr_line(&output),
            }
            .into());
        }
        Ok(())
    }

    async fn path_exists(&self, path: &str) -> Result<bool> {
        let output = self.run(&format!("test -e '{path}'")).await?;
        Ok(output.status.success())
    }

    async fn file_size(&self, path: &str) -> Result<u64> {
        let output = self.run(&format!("wc -c < '{path}'")).await?;
        if !output.status.success() {
            anyhow::bail!("sizing {path} on {} failed: {}", self.target, stderr_line(&output));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u64>()
            .with_context(|| format!("parsing size of {path}"))
    }

    async fn read_leading_bytes(&self, path: &str, count: usize) -> Result<Vec<u8>> {
        let output = self.run(&format!("head -c {count} '{path}'")).await?;
        if !output.status.success() {
            anyhow::bail!("reading {path} on {} failed: {}", self.target, stderr_line(&output));
        }
        Ok(output.stdout)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let output = self.run(&format!("rm -f '{path}'")).await?;
        if !output.status.success() {
            anyhow::bail!("removing {path} on {} failed: {}", self.target, stderr_line(&output));
        }
        Ok(())
    }
}
