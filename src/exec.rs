//! The execution seam shared by both provisioning targets.
//!
//! Every install step talks to its host through [`Executor`], whether that
//! host is the local workstation or a robot behind SSH. Components stay
//! target-agnostic and testable with scripted fakes.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

use crate::runner::{CommandRunner, TokioCommandRunner};

/// Command execution and file plumbing on one target host.
///
/// `run` returns the full [`Output`]; callers interpret exit status.
/// Transport-level failures (dead channel, timeout) surface as errors.
#[allow(async_fn_in_trait)]
pub trait Executor {
    /// Human-readable target name for error messages.
    fn label(&self) -> String;

    /// Run a shell command with the default timeout.
    async fn run(&self, command: &str) -> Result<Output>;

    /// Run a shell command with a custom timeout.
    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> Result<Output>;

    /// Copy a local file to `remote` on the target.
    async fn send(&self, local: &Path, remote: &str) -> Result<()>;

    /// Whether a path exists on the target.
    async fn path_exists(&self, path: &str) -> Result<bool>;

    /// Size of a file on the target, in bytes.
    async fn file_size(&self, path: &str) -> Result<u64>;

    /// Read up to `count` leading bytes of a file on the target.
    async fn read_leading_bytes(&self, path: &str, count: usize) -> Result<Vec<u8>>;

    /// Delete a file on the target. Missing files are not an error.
    async fn remove_file(&self, path: &str) -> Result<()>;
}

/// Prefix a command with `sudo` when the target needs elevation.
#[must_use]
pub fn with_sudo(sudo: bool, command: &str) -> String {
    if sudo {
        format!("sudo {command}")
    } else {
        command.to_string()
    }
}

/// Last non-empty stderr line, for compact error details.
#[must_use]
pub fn stderr_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no error output")
        .trim()
        .to_string()
}

/// Scratch directory on the target where artifacts land before `install -m`
/// moves them into place.
pub const STAGE_DIR: &str = "/tmp/bridgectl-stage";

/// Deliver a staged local file to `dest` on the target with the given mode.
/// The intermediate copy under [`STAGE_DIR`] is removed afterwards.
///
/// # Errors
///
/// Returns [`crate::error::InstallError::PlacementFailed`] when the final
/// placement fails.
pub async fn place_file(
    exec: &impl Executor,
    local: &Path,
    dest: &str,
    mode: &str,
    sudo: bool,
) -> Result<()> {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("staged file has no name")?;
    let staged = format!("{STAGE_DIR}/{name}");

    let mkdir = exec.run(&format!("mkdir -p {STAGE_DIR}")).await?;
    if !mkdir.status.success() {
        return Err(crate::error::InstallError::PlacementFailed {
            path: STAGE_DIR.to_string(),
            detail: stderr_line(&mkdir),
        }
        .into());
    }
    exec.send(local, &staged).await?;
    let placed = exec
        .run(&with_sudo(sudo, &format!("install -m {mode} '{staged}' '{dest}'")))
        .await?;
    if !placed.status.success() {
        return Err(crate::error::InstallError::PlacementFailed {
            path: dest.to_string(),
            detail: stderr_line(&placed),
        }
        .into());
    }
    let _ = exec.remove_file(&staged).await;
    Ok(())
}

/// [`Executor`] for the workstation itself: commands through `sh -c`,
/// file plumbing through the local filesystem.
pub struct LocalExecutor {
    runner: TokioCommandRunner,
}

impl LocalExecutor {
    #[must_use]
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            runner: TokioCommandRunner::new(command_timeout),
        }
    }
}

impl Executor for LocalExecutor {
    fn label(&self) -> String {
        "localhost".to_string()
    }

    async fn run(&self, command: &str) -> Result<Output> {
        self.runner.run("sh", &["-c", command]).await
    }

    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> Result<Output> {
        self.runner
            .run_with_timeout("sh", &["-c", command], timeout)
            .await
    }

    async fn send(&self, local: &Path, remote: &str) -> Result<()> {
        tokio::fs::copy(local, remote)
            .await
            .with_context(|| format!("copying {} to {remote}", local.display()))?;
        Ok(())
    }

    async fn path_exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await.unwrap_or(false))
    }

    async fn file_size(&self, path: &str) -> Result<u64> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("reading metadata of {path}"))?;
        Ok(meta.len())
    }

    async fn read_leading_bytes(&self, path: &str, count: usize) -> Result<Vec<u8>> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening {path}"))?;
        let mut buf = Vec::with_capacity(count);
        file.take(count as u64)
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("reading {path}"))?;
        Ok(buf)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {path}")),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted [`Executor`] fake shared by unit tests.

    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;
    use std::os::unix::process::ExitStatusExt;
    use std::path::PathBuf;
    use std::process::ExitStatus;
    use std::sync::Mutex;

    use super::*;
    use crate::error::ConnectivityError;

    pub(crate) fn ok(stdout: &[u8]) -> Output {
        Output {
            status: ExitStatus::from_raw(0),
            stdout: stdout.to_vec(),
            stderr: Vec::new(),
        }
    }

    pub(crate) fn fail(code: i32) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: b"scripted failure".to_vec(),
        }
    }

    /// A transfer recorded by [`FakeExecutor::send`].
    #[derive(Debug, Clone)]
    pub(crate) struct SentFile {
        pub local: PathBuf,
        pub remote: String,
        pub contents: Vec<u8>,
    }

    /// Fake target host: canned command responses keyed by prefix, an
    /// in-memory file tree, and recorders for every command and transfer.
    /// Commands can be scripted to create files, mimicking a download.
    pub(crate) struct FakeExecutor {
        pub responses: Vec<(String, Output)>,
        pub creates: Vec<(String, String, Vec<u8>)>,
        pub files: Mutex<HashMap<String, Vec<u8>>>,
        pub commands: Mutex<Vec<String>>,
        pub sent: Mutex<Vec<SentFile>>,
        pub dead_link: bool,
    }

    impl FakeExecutor {
        pub(crate) fn new() -> Self {
            Self {
                responses: Vec::new(),
                creates: Vec::new(),
                files: Mutex::new(HashMap::new()),
                commands: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                dead_link: false,
            }
        }

        /// Every command fails as if the transport dropped.
        pub(crate) fn unreachable() -> Self {
            Self {
                dead_link: true,
                ..Self::new()
            }
        }

        /// Script the response for commands starting with `prefix`.
        /// First matching prefix wins.
        pub(crate) fn respond(mut self, prefix: &str, output: Output) -> Self {
            self.responses.push((prefix.to_string(), output));
            self
        }

        /// Script a file that appears when a command starting with `prefix`
        /// runs successfully.
        pub(crate) fn creating(mut self, prefix: &str, path: &str, contents: &[u8]) -> Self {
            self.creates
                .push((prefix.to_string(), path.to_string(), contents.to_vec()));
            self
        }

        pub(crate) fn with_file(self, path: &str, contents: &[u8]) -> Self {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), contents.to_vec());
            self
        }

        pub(crate) fn ran(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }

        pub(crate) fn ran_matching(&self, needle: &str) -> usize {
            self.ran().iter().filter(|c| c.contains(needle)).count()
        }

        pub(crate) fn sent_files(&self) -> Vec<SentFile> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Executor for FakeExecutor {
        fn label(&self) -> String {
            "fake-target".to_string()
        }

        async fn run(&self, command: &str) -> Result<Output> {
            self.commands.lock().unwrap().push(command.to_string());
            if self.dead_link {
                return Err(ConnectivityError::Dropped {
                    target: self.label(),
                    command: command.to_string(),
                }
                .into());
            }
            let response = self
                .responses
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map_or_else(
                    || ok(b""),
                    |(_, output)| Output {
                        status: output.status,
                        stdout: output.stdout.clone(),
                        stderr: output.stderr.clone(),
                    },
                );
            if response.status.success() {
                for (prefix, path, contents) in &self.creates {
                    if command.starts_with(prefix.as_str()) {
                        self.files
                            .lock()
                            .unwrap()
                            .insert(path.clone(), contents.clone());
                    }
                }
            }
            Ok(response)
        }

        async fn run_with_timeout(&self, command: &str, _timeout: Duration) -> Result<Output> {
            self.run(command).await
        }

        async fn send(&self, local: &Path, remote: &str) -> Result<()> {
            if self.dead_link {
                return Err(ConnectivityError::Dropped {
                    target: self.label(),
                    command: format!("send {remote}"),
                }
                .into());
            }
            let contents = std::fs::read(local).unwrap_or_default();
            self.sent.lock().unwrap().push(SentFile {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                contents: contents.clone(),
            });
            self.files
                .lock()
                .unwrap()
                .insert(remote.to_string(), contents);
            Ok(())
        }

        async fn path_exists(&self, path: &str) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        async fn file_size(&self, path: &str) -> Result<u64> {
            let files = self.files.lock().unwrap();
            let contents = files
                .get(path)
                .with_context(|| format!("no such file {path}"))?;
            Ok(contents.len() as u64)
        }

        async fn read_leading_bytes(&self, path: &str, count: usize) -> Result<Vec<u8>> {
            let files = self.files.lock().unwrap();
            let contents = files
                .get(path)
                .with_context(|| format!("no such file {path}"))?;
            Ok(contents.iter().copied().take(count).collect())
        }

        async fn remove_file(&self, path: &str) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
    }
}
