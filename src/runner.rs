//! Process execution with timeout and guaranteed kill.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout};

/// Spawns external commands with a bounded lifetime. Every ssh, scp, and
/// local shell invocation in the crate goes through this; test doubles
/// script results without spawning anything.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command with the default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a command with a custom timeout.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

async fn drain_stdout(pipe: Option<ChildStdout>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

async fn drain_stderr(pipe: Option<ChildStderr>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

/// Production [`CommandRunner`] on `tokio::process`.
///
/// A plain `tokio::time::timeout` around `.output().await` drops the future
/// but leaves the OS process running. Here the timeout arm explicitly kills
/// the child, so a hung ssh never outlives the tool.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let out = child.stdout.take();
        let err = child.stderr.take();

        // Drain both pipes concurrently with wait(). A child that writes
        // more than the OS pipe buffer blocks until someone reads, so
        // waiting before reading would deadlock.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) =
                    tokio::join!(child.wait(), drain_stdout(out), drain_stderr(err));
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn run_captures_stdout() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let out = runner.run("sh", &["-c", "printf hello"]).await.unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, b"hello");
    }

    #[tokio::test]
    async fn run_captures_failure_status_and_stderr() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let out = runner
            .run("sh", &["-c", "echo oops >&2; exit 3"])
            .await
            .unwrap();
        assert!(!out.status.success());
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "oops");
    }

    #[tokio::test]
    async fn run_with_timeout_kills_slow_child() {
        let runner = TokioCommandRunner::new(Duration::from_secs(30));
        let started = std::time::Instant::now();
        let result = runner
            .run_with_timeout("sh", &["-c", "sleep 30"], Duration::from_millis(200))
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("timed out"));
    }

    #[tokio::test]
    async fn large_output_does_not_deadlock_the_pipes() {
        let runner = TokioCommandRunner::new(Duration::from_secs(10));
        // well past any OS pipe buffer
        let out = runner
            .run("sh", &["-c", "head -c 1000000 /dev/zero"])
            .await
            .unwrap();
        assert_eq!(out.stdout.len(), 1_000_000);
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let result = runner.run("definitely-not-a-real-program", &[]).await;
        assert!(result.is_err());
    }
}
