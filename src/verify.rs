//! Post-install verification battery.
//!
//! Five checks proving the bridge is installed, running, and actually
//! routing the robot's telemetry topics. Every check catches its own
//! failures so one broken layer never hides the state of the others.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::VerificationFailure;
use crate::exec::Executor;
use crate::service;
use crate::settings::Settings;

// ── Network probe seam ────────────────────────────────────────────────────────

/// Outcome of one HTTP probe. Non-2xx statuses are values, not errors;
/// only transport failures surface as `Err`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Network reachability operations the battery needs. Implemented for real
/// sockets in production and stubbed in tests.
#[allow(async_fn_in_trait)]
pub trait NetProbe {
    async fn http_get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
    async fn tcp_connect(&self, host: &str, port: u16, timeout: Duration) -> Result<bool>;
}

/// Production probe: blocking `ureq` and `TcpStream` moved off the async
/// runtime with `spawn_blocking`.
pub struct UreqProbe;

impl NetProbe for UreqProbe {
    async fn http_get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || match ureq::get(&url).timeout(timeout).call() {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.into_string().context("reading response body")?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(code, resp)) => Ok(HttpResponse {
                status: code,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(e) => Err(anyhow::anyhow!("request to {url} failed: {e}")),
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))?
    }

    async fn tcp_connect(&self, host: &str, port: u16, timeout: Duration) -> Result<bool> {
        let addr = format!("{host}:{port}");
        tokio::task::spawn_blocking(move || {
            use std::net::ToSocketAddrs;
            let resolved = addr
                .to_socket_addrs()
                .with_context(|| format!("resolving {addr}"))?
                .next()
                .with_context(|| format!("{addr} resolved to no addresses"))?;
            Ok::<bool, anyhow::Error>(
                std::net::TcpStream::connect_timeout(&resolved, timeout).is_ok(),
            )
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))?
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// One named check with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail,
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail,
        }
    }
}

/// The full battery outcome, in execution order.
#[derive(Debug, Serialize)]
pub struct VerificationReport {
    pub started_at: String,
    pub checks: Vec<Check>,
}

impl VerificationReport {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// The typed failure for callers that treat an imperfect battery as fatal.
    #[must_use]
    pub fn to_failure(&self) -> VerificationFailure {
        VerificationFailure {
            failed: self.failed(),
            total: self.checks.len(),
        }
    }
}

// ── Battery ───────────────────────────────────────────────────────────────────

/// Run the network-facing checks against `host`: peer port, REST admin,
/// route presence, and one check per expected topic.
pub async fn run_checks(
    probe: &impl NetProbe,
    settings: &Settings,
    host: &str,
    rest_port: u16,
) -> VerificationReport {
    let mut checks = Vec::new();
    collect_network_checks(probe, settings, host, rest_port, &mut checks).await;
    VerificationReport {
        started_at: chrono::Utc::now().to_rfc3339(),
        checks,
    }
}

/// The robot battery: systemd unit state first, then the network checks
/// against the robot's REST port.
pub async fn run_checks_with_service(
    exec: &impl Executor,
    probe: &impl NetProbe,
    settings: &Settings,
    host: &str,
) -> VerificationReport {
    let mut checks = vec![check_service(exec, settings).await];
    collect_network_checks(
        probe,
        settings,
        host,
        settings.rest_port(crate::settings::Role::Robot),
        &mut checks,
    )
    .await;
    VerificationReport {
        started_at: chrono::Utc::now().to_rfc3339(),
        checks,
    }
}

async fn collect_network_checks(
    probe: &impl NetProbe,
    settings: &Settings,
    host: &str,
    rest_port: u16,
    checks: &mut Vec<Check>,
) {
    let base = format!("http://{host}:{rest_port}");
    checks.push(check_bridge_port(probe, settings, host).await);
    checks.push(check_rest_admin(probe, settings, &base).await);
    checks.push(check_routes(probe, settings, &base).await);
    for topic in &settings.topics {
        checks.push(check_topic(probe, settings, &base, topic).await);
    }
}

async fn check_service(exec: &impl Executor, settings: &Settings) -> Check {
    const NAME: &str = "service";
    match service::status(exec, settings).await {
        Ok(state) if state.is_active() => Check::pass(NAME, format!("systemd reports {state}")),
        Ok(state) => Check::fail(NAME, format!("systemd reports {state}")),
        Err(e) => Check::fail(NAME, format!("cannot query systemd: {e:#}")),
    }
}

async fn check_bridge_port(probe: &impl NetProbe, settings: &Settings, host: &str) -> Check {
    let name = format!("peer port {}", settings.bridge_port);
    match probe
        .tcp_connect(host, settings.bridge_port, settings.check_timeout)
        .await
    {
        Ok(true) => Check::pass(&name, format!("{host}:{} accepts connections", settings.bridge_port)),
        Ok(false) => Check::fail(&name, format!("{host}:{} refused", settings.bridge_port)),
        Err(e) => Check::fail(&name, format!("{e:#}")),
    }
}

async fn check_rest_admin(probe: &impl NetProbe, settings: &Settings, base: &str) -> Check {
    const NAME: &str = "rest admin";
    let url = format!("{base}/@/local/router");
    match probe.http_get(&url, settings.check_timeout).await {
        Ok(resp) if resp.status == 200 => {
            let detail = match bridge_version(&resp.body) {
                Some(version) => format!("responding, bridge {version}"),
                None => "responding".to_string(),
            };
            Check::pass(NAME, detail)
        }
        Ok(resp) => Check::fail(NAME, format!("HTTP {} from {url}", resp.status)),
        Err(e) => Check::fail(NAME, format!("{e:#}")),
    }
}

async fn check_routes(probe: &impl NetProbe, settings: &Settings, base: &str) -> Check {
    const NAME: &str = "dds routes";
    let url = format!("{base}/@/*/dds/route/**");
    match probe.http_get(&url, settings.check_timeout).await {
        Ok(resp) if resp.status == 200 => match route_count(&resp.body) {
            Some(0) | None => Check::fail(NAME, "no DDS routes established".to_string()),
            Some(n) => Check::pass(NAME, format!("{n} routes established")),
        },
        Ok(resp) => Check::fail(NAME, format!("HTTP {} from admin space", resp.status)),
        Err(e) => Check::fail(NAME, format!("{e:#}")),
    }
}

async fn check_topic(
    probe: &impl NetProbe,
    settings: &Settings,
    base: &str,
    topic: &str,
) -> Check {
    let name = format!("topic {topic}");
    let key = if settings.scope.is_empty() {
        topic.to_string()
    } else {
        format!("{}/{topic}", settings.scope)
    };
    let url = format!("{base}/@/*/dds/route/from_dds/{key}");
    match probe.http_get(&url, settings.check_timeout).await {
        Ok(resp) if resp.status == 200 => match route_count(&resp.body) {
            Some(0) | None => Check::fail(&name, "no route for this topic".to_string()),
            Some(_) => Check::pass(&name, "routed from DDS".to_string()),
        },
        Ok(resp) => Check::fail(&name, format!("HTTP {} from admin space", resp.status)),
        Err(e) => Check::fail(&name, format!("{e:#}")),
    }
}

/// Bridge version from the admin-space router document, when present.
fn bridge_version(body: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(body).ok()?;
    doc.pointer("/0/value/version")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}

/// Number of entries in an admin-space listing, `None` when the body is
/// not a JSON array.
fn route_count(body: &str) -> Option<usize> {
    let doc: serde_json::Value = serde_json::from_str(body).ok()?;
    doc.as_array().map(Vec::len)
}
