//! Host platform resolution to a bridge release target triple.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::UnsupportedPlatform;
use crate::exec::Executor;

/// Operating system family with a published bridge artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Darwin,
}

/// CPU architecture with a published bridge artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuArch {
    X86_64,
    Aarch64,
}

/// A supported (os, arch) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: CpuArch,
}

impl Platform {
    /// The robot controller is always this; no probing happens for it.
    pub const ROBOT: Self = Self {
        os: OsFamily::Linux,
        arch: CpuArch::Aarch64,
    };

    /// Map raw `uname -s` / `uname -m` spellings to a supported platform.
    /// Runs before any network access so an unsupported host downloads
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedPlatform`] for any pair outside the supported set.
    pub fn resolve(os_name: &str, arch_name: &str) -> Result<Self, UnsupportedPlatform> {
        let unsupported = || UnsupportedPlatform {
            os: os_name.trim().to_lowercase(),
            arch: arch_name.trim().to_lowercase(),
        };
        let os = match os_name.trim().to_lowercase().as_str() {
            "linux" => OsFamily::Linux,
            "darwin" | "macos" => OsFamily::Darwin,
            _ => return Err(unsupported()),
        };
        let arch = match arch_name.trim().to_lowercase().as_str() {
            "x86_64" | "amd64" => CpuArch::X86_64,
            "arm64" | "aarch64" => CpuArch::Aarch64,
            _ => return Err(unsupported()),
        };
        Ok(Self { os, arch })
    }

    /// Probe the target's own platform through its `uname`.
    ///
    /// # Errors
    ///
    /// Returns an error if `uname` fails or the pair is unsupported.
    pub async fn detect(exec: &impl Executor) -> Result<Self> {
        let os = uname(exec, "-s").await?;
        let arch = uname(exec, "-m").await?;
        Ok(Self::resolve(&os, &arch)?)
    }

    /// Release artifact target triple for this platform.
    #[must_use]
    pub fn triple(self) -> &'static str {
        match (self.os, self.arch) {
            (OsFamily::Linux, CpuArch::X86_64) => "x86_64-unknown-linux-gnu",
            (OsFamily::Linux, CpuArch::Aarch64) => "aarch64-unknown-linux-gnu",
            (OsFamily::Darwin, CpuArch::X86_64) => "x86_64-apple-darwin",
            (OsFamily::Darwin, CpuArch::Aarch64) => "aarch64-apple-darwin",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let os = match self.os {
            OsFamily::Linux => "linux",
            OsFamily::Darwin => "darwin",
        };
        let arch = match self.arch {
            CpuArch::X86_64 => "x86_64",
            CpuArch::Aarch64 => "aarch64",
        };
        write!(f, "{os}/{arch}")
    }
}

async fn uname(exec: &impl Executor, flag: &str) -> Result<String> {
    let output = exec
        .run(&format!("uname {flag}"))
        .await
        .with_context(|| format!("probing platform on {}", exec.label()))?;
    if !output.status.success() {
        anyhow::bail!("uname {flag} failed on {}", exec.label());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
