//! Bridge release download, payload validation, and on-target install.
//!
//! Downloads run on the target itself (curl first, wget as the fallback
//! transport) so the robot pulls the archive over its own uplink. The
//! archive is validated before anything is extracted and deleted afterwards
//! whether or not the install succeeded.

use anyhow::{Context, Result};

use crate::error::{ConnectivityError, FetchError, InstallError};
use crate::exec::{Executor, place_file, stderr_line, with_sudo};
use crate::output::ProgressReporter;
use crate::plan::Manifest;
use crate::settings::{BRIDGE_BINARY, MANIFEST_FILE, Settings};

/// Leading bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Release archive file name for a version and target triple.
#[must_use]
pub fn archive_filename(version: &str, triple: &str) -> String {
    format!("{BRIDGE_BINARY}-{version}-{triple}.tgz")
}

/// Deterministic release URL: the same version and triple always yield the
/// same URL, so re-runs are reproducible.
#[must_use]
pub fn archive_url(version: &str, triple: &str) -> String {
    format!(
        "https://github.com/eclipse-zenoh/zenoh-plugin-dds/releases/download/{version}/{}",
        archive_filename(version, triple)
    )
}

/// Download the release archive for `triple` into `dest_dir` on the target
/// and validate the payload. Returns the archive path.
///
/// Any stale file at the destination is deleted first; there is no partial
/// resume. `require_gzip` additionally checks the gzip magic bytes, for
/// targets where a corrupt archive would otherwise only fail at extraction.
///
/// # Errors
///
/// Returns [`FetchError`] when both transports fail or the payload is
/// empty or corrupt; connectivity errors propagate unchanged.
pub async fn fetch(
    exec: &impl Executor,
    settings: &Settings,
    triple: &str,
    dest_dir: &str,
    require_gzip: bool,
    reporter: &impl ProgressReporter,
) -> Result<String> {
    let version = &settings.bridge_version;
    let url = archive_url(version, triple);
    let dest = format!("{dest_dir}/{}", archive_filename(version, triple));

    exec.remove_file(&dest).await?;

    reporter.step(&format!("downloading {BRIDGE_BINARY} {version} for {triple}"));
    let curl = format!("curl -fsSL -o '{dest}' '{url}'");
    let downloaded = match exec.run_with_timeout(&curl, settings.download_timeout).await {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            reporter.warn(&format!(
                "curl failed ({}), falling back to wget",
                stderr_line(&output)
            ));
            false
        }
        Err(e) if e.downcast_ref::<ConnectivityError>().is_some() => return Err(e),
        Err(e) => {
            reporter.warn(&format!("curl failed ({e:#}), falling back to wget"));
            false
        }
    };
    if !downloaded {
        let wget = format!("wget -q -O '{dest}' '{url}'");
        let output = exec.run_with_timeout(&wget, settings.download_timeout).await?;
        if !output.status.success() {
            // wget -O leaves an empty file behind on failure
            let _ = exec.remove_file(&dest).await;
            return Err(FetchError::AllTransportsFailed {
                url,
                detail: stderr_line(&output),
            }
            .into());
        }
    }

    let size = exec.file_size(&dest).await?;
    if size == 0 {
        let _ = exec.remove_file(&dest).await;
        return Err(FetchError::EmptyPayload {
            path: dest,
            version: version.clone(),
            triple: triple.to_string(),
        }
        .into());
    }
    if require_gzip {
        let lead = exec.read_leading_bytes(&dest, GZIP_MAGIC.len()).await?;
        if lead != GZIP_MAGIC {
            let _ = exec.remove_file(&dest).await;
            return Err(FetchError::CorruptPayload { path: dest }.into());
        }
    }
    reporter.success(&format!("archive validated ({size} bytes)"));
    Ok(dest)
}

/// Extract the archive into `install_dir`, mark the binary executable,
/// write the install manifest, and optionally refresh the stable symlink.
/// The archive is deleted afterwards regardless of outcome.
///
/// # Errors
///
/// Returns [`InstallError`] when extraction or placement fails.
pub async fn install_archive(
    exec: &impl Executor,
    settings: &Settings,
    triple: &str,
    archive: &str,
    install_dir: &str,
    sudo: bool,
    link: Option<&str>,
) -> Result<()> {
    let result = install_steps(exec, settings, triple, archive, install_dir, sudo, link).await;
    let _ = exec.remove_file(archive).await;
    result
}

async fn install_steps(
    exec: &impl Executor,
    settings: &Settings,
    triple: &str,
    archive: &str,
    install_dir: &str,
    sudo: bool,
    link: Option<&str>,
) -> Result<()> {
    let bin = format!("{install_dir}/{BRIDGE_BINARY}");

    let mkdir = exec
        .run(&with_sudo(sudo, &format!("mkdir -p '{install_dir}'")))
        .await?;
    if !mkdir.status.success() {
        return Err(InstallError::PlacementFailed {
            path: install_dir.to_string(),
            detail: stderr_line(&mkdir),
        }
        .into());
    }

    let extract = exec
        .run(&with_sudo(sudo, &format!("tar -xzf '{archive}' -C '{install_dir}'")))
        .await?;
    if !extract.status.success() {
        return Err(InstallError::ExtractFailed {
            archive: archive.to_string(),
            detail: stderr_line(&extract),
        }
        .into());
    }

    let chmod = exec
        .run(&with_sudo(sudo, &format!("chmod 0755 '{bin}'")))
        .await?;
    if !chmod.status.success() {
        return Err(InstallError::PlacementFailed {
            path: bin,
            detail: stderr_line(&chmod),
        }
        .into());
    }

    let manifest = Manifest {
        version: settings.bridge_version.clone(),
        triple: triple.to_string(),
        installed_at: chrono::Utc::now().to_rfc3339(),
    };
    let staging = tempfile::tempdir().context("creating staging directory")?;
    let local = staging.path().join(MANIFEST_FILE);
    let rendered = serde_json::to_string_pretty(&manifest).context("rendering manifest")?;
    tokio::fs::write(&local, rendered)
        .await
        .context("writing manifest")?;
    place_file(exec, &local, &format!("{install_dir}/{MANIFEST_FILE}"), "0644", sudo).await?;

    if let Some(link) = link {
        let linked = exec
            .run(&with_sudo(sudo, &format!("ln -sfn '{bin}' '{link}'")))
            .await?;
        if !linked.status.success() {
            return Err(InstallError::PlacementFailed {
                path: link.to_string(),
                detail: stderr_line(&linked),
            }
            .into());
        }
    }
    Ok(())
}
