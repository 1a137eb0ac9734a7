//! HealthProbe - one health determination with multi-target fallback
//!
//! ## Attempt order
//!
//! ```text
//! internal / override URL → public URL → loopback hosts × port
//!          │                    │                 │
//!          └── first 2xx wins, later targets are never tried
//! ```
//!
//! Every attempt is recorded, successful or not. Only when all of them fail
//! does the probe look at process and port liveness, which is what separates
//! `degraded` (server alive, endpoint unreachable) from `failed`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::fetch::{FetchOutcome, HttpFetcher};
use super::port::PortChecker;
use super::process::{ProcessDescriptor, ProcessInfo, ProcessInspector};
use crate::config::ProbeConfig;
use crate::util::truncate_message;

/// Longest attempt error text kept in a report
pub const MAX_ATTEMPT_ERROR_LEN: usize = 200;

/// Where a target came from, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Internal,
    Public,
    Localhost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub kind: TargetKind,
    pub url: String,
}

impl ProbeTarget {
    pub fn new(kind: TargetKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }

    /// Key used for deduplication (scheme/host case, default ports)
    fn normalized(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.url.trim_end_matches('/').to_ascii_lowercase())
    }
}

/// One probe try
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthAttempt {
    pub target: ProbeTarget,
    pub success: bool,
    pub latency_ms: u64,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl HealthAttempt {
    pub fn succeeded(target: ProbeTarget, latency_ms: u64, http_status: u16) -> Self {
        Self {
            target,
            success: true,
            latency_ms,
            http_status: Some(http_status),
            error: None,
        }
    }

    pub fn failed(
        target: ProbeTarget,
        latency_ms: u64,
        http_status: Option<u16>,
        error: impl AsRef<str>,
    ) -> Self {
        Self {
            target,
            success: false,
            latency_ms,
            http_status,
            error: Some(truncate_message(error.as_ref(), MAX_ATTEMPT_ERROR_LEN)),
        }
    }

    fn from_outcome(target: ProbeTarget, outcome: FetchOutcome) -> Self {
        let latency_ms = outcome.latency.as_millis() as u64;
        match (outcome.is_success(), outcome.status_code, outcome.error) {
            (true, Some(code), _) => Self::succeeded(target, latency_ms, code),
            (_, status, Some(error)) => Self::failed(target, latency_ms, status, error),
            (_, Some(code), None) => {
                Self::failed(target, latency_ms, Some(code), format!("unexpected status {code}"))
            }
            (_, None, None) => Self::failed(target, latency_ms, None, "no response"),
        }
    }
}

/// Derived service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

impl HealthStatus {
    /// healthy iff some attempt succeeded; degraded iff none did but the
    /// process runs and the port accepts connections; failed otherwise
    pub fn derive(any_success: bool, process_running: bool, port_open: bool) -> Self {
        if any_success {
            HealthStatus::Healthy
        } else if process_running && port_open {
            HealthStatus::Degraded
        } else {
            HealthStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "failed" => Ok(HealthStatus::Failed),
            other => Err(format!("unknown health status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

/// Aggregate result of one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthReport {
    pub checked_at: DateTime<Utc>,
    pub status: HealthStatus,

    /// Attempts in the order they were made
    pub attempts: Vec<HealthAttempt>,

    pub successful_target: Option<ProbeTarget>,

    /// Only populated when every attempt failed
    pub process: Option<ProcessInfo>,
    pub port: Option<PortInfo>,

    pub duration_ms: u64,
}

impl ServiceHealthReport {
    /// Short description used in alert notifications
    pub fn summary(&self) -> String {
        match self.status {
            HealthStatus::Healthy => match &self.successful_target {
                Some(target) => format!("healthy via {}", target.url),
                None => "healthy".to_string(),
            },
            status => {
                let last_error = self
                    .attempts
                    .last()
                    .and_then(|a| a.error.as_deref())
                    .unwrap_or("no attempts");
                format!(
                    "{status}: {} attempt(s) failed, last error: {last_error}",
                    self.attempts.len()
                )
            }
        }
    }
}

/// Settings for the liveness fallbacks
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Timeout applied to each HTTP attempt and to the port connect
    pub attempt_timeout: Duration,

    /// Expected server process; without one the process counts as not running
    pub process: Option<ProcessDescriptor>,

    pub port_host: String,
    pub port: u16,
}

/// Ordered, deduplicated target list for a probe configuration
pub fn plan_targets(config: &ProbeConfig) -> Vec<ProbeTarget> {
    let mut targets = Vec::new();

    if let Some(url) = &config.internal_url {
        targets.push(ProbeTarget::new(
            TargetKind::Internal,
            with_health_path(url, &config.health_path),
        ));
    }

    if let Some(url) = &config.public_url {
        targets.push(ProbeTarget::new(
            TargetKind::Public,
            with_health_path(url, &config.health_path),
        ));
    }

    for host in &config.loopback_hosts {
        targets.push(ProbeTarget::new(
            TargetKind::Localhost,
            format!(
                "{}://{host}:{}{}",
                config.loopback_scheme, config.port, config.health_path
            ),
        ));
    }

    dedup_targets(targets)
}

/// Append the health path to bare base URLs, leave explicit paths alone
fn with_health_path(base: &str, health_path: &str) -> String {
    match url::Url::parse(base) {
        Ok(mut url) if url.path() == "/" || url.path().is_empty() => {
            url.set_path(health_path);
            url.to_string()
        }
        _ => base.to_string(),
    }
}

/// Drop later duplicates, keeping the highest-priority occurrence
pub fn dedup_targets(targets: Vec<ProbeTarget>) -> Vec<ProbeTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.normalized()))
        .collect()
}

/// Performs health determinations; has no side effects beyond its report
#[derive(Clone)]
pub struct HealthProbe {
    fetcher: Arc<dyn HttpFetcher>,
    processes: Arc<dyn ProcessInspector>,
    ports: Arc<dyn PortChecker>,
}

impl HealthProbe {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        processes: Arc<dyn ProcessInspector>,
        ports: Arc<dyn PortChecker>,
    ) -> Self {
        Self {
            fetcher,
            processes,
            ports,
        }
    }

    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn probe(
        &self,
        targets: &[ProbeTarget],
        fallback: &FallbackConfig,
    ) -> ServiceHealthReport {
        let start = Instant::now();
        let targets = dedup_targets(targets.to_vec());

        let mut attempts = Vec::with_capacity(targets.len());
        let mut successful_target = None;

        for target in targets {
            trace!("attempting {:?} target {}", target.kind, target.url);
            let outcome = self
                .fetcher
                .fetch(&target.url, fallback.attempt_timeout)
                .await;
            let attempt = HealthAttempt::from_outcome(target, outcome);
            let success = attempt.success;

            if success {
                successful_target = Some(attempt.target.clone());
            } else {
                debug!(
                    "attempt on {} failed: {}",
                    attempt.target.url,
                    attempt.error.as_deref().unwrap_or("unknown error")
                );
            }

            attempts.push(attempt);
            if success {
                break;
            }
        }

        let (process, port) = if successful_target.is_some() {
            (None, None)
        } else {
            let (process, port_open) = tokio::join!(
                self.check_process(fallback.process.as_ref()),
                self.ports
                    .is_port_open(&fallback.port_host, fallback.port, fallback.attempt_timeout)
            );
            let port = PortInfo {
                host: fallback.port_host.clone(),
                port: fallback.port,
                open: port_open,
            };
            (process, Some(port))
        };

        let status = HealthStatus::derive(
            successful_target.is_some(),
            process.as_ref().is_some_and(|p| p.running),
            port.as_ref().is_some_and(|p| p.open),
        );

        debug!("probe finished: {status} after {} attempt(s)", attempts.len());

        ServiceHealthReport {
            checked_at: Utc::now(),
            status,
            attempts,
            successful_target,
            process,
            port,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_process(&self, descriptor: Option<&ProcessDescriptor>) -> Option<ProcessInfo> {
        match descriptor {
            Some(descriptor) => Some(self.processes.is_process_running(descriptor).await),
            None => None,
        }
    }
}
