//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Messages are written for the operator: they state
//! what failed and what to do about it.

use thiserror::Error;

// ── Target and argument errors ────────────────────────────────────────────────

/// Errors validating the target address before any work starts.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Invalid target '{0}': expected HOST or USER@HOST.")]
    InvalidHost(String),

    #[error("Invalid robot address '{0}': expected a bare hostname or IP.")]
    InvalidAddress(String),
}

// ── Connectivity errors ───────────────────────────────────────────────────────

/// Errors establishing or using the SSH control channel.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error(
        "Cannot reach {target}: {detail}\nCheck the address, network, and SSH credentials, then retry."
    )]
    Unreachable { target: String, detail: String },

    #[error("Connection to {target} lost while running '{command}'.")]
    Dropped { target: String, command: String },

    #[error("'{command}' on {target} exceeded {seconds}s and was stopped.")]
    Timeout {
        target: String,
        command: String,
        seconds: u64,
    },
}

// ── Platform errors ───────────────────────────────────────────────────────────

/// Raised when the host is outside the supported platform set.
/// Resolution happens before any network access, so nothing is downloaded
/// for a platform that has no release artifact.
#[derive(Debug, Error)]
#[error(
    "Unsupported platform {os}/{arch}.\nSupported: darwin/arm64, darwin/x86_64, linux/x86_64, linux/aarch64."
)]
pub struct UnsupportedPlatform {
    pub os: String,
    pub arch: String,
}

// ── Fetch errors ──────────────────────────────────────────────────────────────

/// Errors downloading, transferring, or validating the bridge archive.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Download failed from {url}\ncurl and wget both failed; last error: {detail}")]
    AllTransportsFailed { url: String, detail: String },

    #[error(
        "Downloaded archive {path} is empty.\nThe release {version} may not publish an artifact for {triple}."
    )]
    EmptyPayload {
        path: String,
        version: String,
        triple: String,
    },

    #[error(
        "Downloaded archive {path} is not gzip data (bad magic bytes); removed it.\nCheck the pinned version and retry."
    )]
    CorruptPayload { path: String },

    #[error("Transferring {local} to {remote} failed: {detail}")]
    TransferFailed {
        local: String,
        remote: String,
        detail: String,
    },
}

// ── Install errors ────────────────────────────────────────────────────────────

/// Errors extracting or placing files on the target.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Extracting {archive} failed: {detail}")]
    ExtractFailed { archive: String, detail: String },

    #[error("Could not place {path}: {detail}")]
    PlacementFailed { path: String, detail: String },
}

// ── Service errors ────────────────────────────────────────────────────────────

/// Errors registering or driving the supervised service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(
        "Passwordless sudo is required on the robot to manage the service.\nConfigure NOPASSWD for this user, or install manually."
    )]
    PrivilegeRequired,

    #[error("Registering {unit} failed: {detail}")]
    RegisterFailed { unit: String, detail: String },

    #[error("Controlling service {name} failed: {detail}")]
    ControlFailed { name: String, detail: String },

    #[error(
        "Service {name} did not reach active state (currently {state}).\nInspect it with: journalctl -u {name} -n 50"
    )]
    StartFailed { name: String, state: String },
}

// ── Verification errors ───────────────────────────────────────────────────────

/// Raised in test mode when the check battery has failures.
#[derive(Debug, Error)]
#[error("{failed} of {total} verification checks failed")]
pub struct VerificationFailure {
    pub failed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_message_names_target_and_remedy() {
        let err = ConnectivityError::Unreachable {
            target: "unitree@192.168.123.18:22".to_string(),
            detail: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("unitree@192.168.123.18:22"));
        assert!(msg.contains("retry"));
    }

    #[test]
    fn unsupported_platform_lists_supported_set() {
        let err = UnsupportedPlatform {
            os: "windows".to_string(),
            arch: "x86_64".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("windows/x86_64"));
        assert!(msg.contains("linux/aarch64"));
    }

    #[test]
    fn verification_failure_reports_tally() {
        let err = VerificationFailure {
            failed: 2,
            total: 7,
        };
        assert_eq!(err.to_string(), "2 of 7 verification checks failed");
    }
}
