//! SystemMonitor - one monitoring cycle, guarded
//!
//! ## Cycle
//!
//! ```text
//! Idle ─▶ Cooling-down ─▶ Probing ─▶ Evaluating ─▶ Idle
//!  │          │              │
//!  │          │              └─ max runtime exceeded ─▶ `probe_runtime` alert
//!  │          └─ too soon after the last cycle ─▶ skipped
//!  └─ another cycle in flight ─▶ skipped, never queued
//! ```
//!
//! The single-flight guard is an owned mutex guard living inside the cycle
//! future, so it is released on every exit path including cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use super::probe::{FallbackConfig, HealthProbe, HealthStatus, ProbeTarget, ServiceHealthReport};
use super::resources::{MetricsSampler, ResourceReadings};
use crate::actors::messages::HealthReportEvent;
use crate::alerts::{AlertManager, Observation};
use crate::config::ProbeConfig;
use crate::monitors::probe::plan_targets;
use crate::settings::{MonitoringSettings, SettingsStore};
use crate::storage::{HealthReportRow, ReportHistory};

/// Alert key for the web server's health status
pub const WEB_SERVER_KEY: &str = "web_server";

/// Alert key for probes exceeding their runtime budget
pub const PROBE_RUNTIME_KEY: &str = "probe_runtime";

/// How a call to [`SystemMonitor::run_cycle`] ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed { status: HealthStatus },
    TimedOut { budget_secs: u64 },
    /// Another cycle was still running
    Skipped,
    CoolingDown { remaining_ms: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounters {
    pub completed: u64,
    pub timed_out: u64,
    pub skipped_in_flight: u64,
    pub skipped_cooldown: u64,
}

/// Point-in-time view of the monitor, published after every state change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub in_flight: bool,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
    pub last_timeout_at: Option<DateTime<Utc>>,
    pub last_report: Option<ServiceHealthReport>,
    pub last_readings: Option<ResourceReadings>,

    /// Error of the latest settings reload, if it failed
    pub settings_error: Option<String>,

    pub counters: CycleCounters,
}

/// State only touched while holding the single-flight guard
#[derive(Debug, Default)]
struct FlightState {
    last_finished: Option<Instant>,
}

pub struct SystemMonitor {
    probe: HealthProbe,
    sampler: Arc<dyn MetricsSampler>,
    alerts: Arc<AlertManager>,
    settings: Arc<SettingsStore>,
    history: Option<Arc<dyn ReportHistory>>,

    targets: Vec<ProbeTarget>,
    probe_config: ProbeConfig,

    flight: Arc<Mutex<FlightState>>,
    status: watch::Sender<MonitorStatus>,
    events: broadcast::Sender<HealthReportEvent>,
}

impl SystemMonitor {
    pub fn new(
        probe: HealthProbe,
        sampler: Arc<dyn MetricsSampler>,
        alerts: Arc<AlertManager>,
        settings: Arc<SettingsStore>,
        probe_config: ProbeConfig,
    ) -> Self {
        let (status, _) = watch::channel(MonitorStatus::default());
        let (events, _) = broadcast::channel(64);

        Self {
            probe,
            sampler,
            alerts,
            settings,
            history: None,
            targets: plan_targets(&probe_config),
            probe_config,
            flight: Arc::new(Mutex::new(FlightState::default())),
            status,
            events,
        }
    }

    /// Store every completed report in `history`
    pub fn with_history(mut self, history: Arc<dyn ReportHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn targets(&self) -> &[ProbeTarget] {
        &self.targets
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthReportEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> MonitorStatus {
        let mut status = self.status.borrow().clone();
        status.in_flight = self.flight.try_lock().is_err();
        status
    }

    /// Run one guarded cycle
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(mut flight) = self.flight.clone().try_lock_owned() else {
            debug!("monitoring cycle still in flight, skipping");
            self.status
                .send_modify(|s| s.counters.skipped_in_flight += 1);
            return CycleOutcome::Skipped;
        };

        let settings = self.load_settings().await;

        if let Some(last) = flight.last_finished {
            let since = last.elapsed();
            if since < settings.cooldown() {
                let remaining = settings.cooldown() - since;
                trace!("cooling down for another {}ms", remaining.as_millis());
                self.status.send_modify(|s| s.counters.skipped_cooldown += 1);
                return CycleOutcome::CoolingDown {
                    remaining_ms: remaining.as_millis() as u64,
                };
            }
        }

        self.status.send_modify(|s| {
            s.in_flight = true;
            s.last_cycle_started_at = Some(Utc::now());
        });

        let outcome = self.probe_and_evaluate(&settings).await;

        flight.last_finished = Some(Instant::now());
        self.status.send_modify(|s| {
            s.in_flight = false;
            s.last_cycle_finished_at = Some(Utc::now());
            match outcome {
                CycleOutcome::Completed { .. } => s.counters.completed += 1,
                CycleOutcome::TimedOut { .. } => s.counters.timed_out += 1,
                _ => {}
            }
        });

        outcome
    }

    /// Fresh settings, or the previous snapshot if the store is unreadable
    async fn load_settings(&self) -> Arc<MonitoringSettings> {
        let settings = match self.settings.reload().await {
            Ok(settings) => settings,
            Err(_) => self.settings.current(),
        };

        let error = self.settings.last_reload_error();
        self.status.send_modify(|s| s.settings_error = error);
        settings
    }

    async fn probe_and_evaluate(&self, settings: &MonitoringSettings) -> CycleOutcome {
        let fallback = FallbackConfig {
            attempt_timeout: settings.attempt_timeout(),
            process: self.probe_config.process.clone(),
            port_host: self.probe_config.port_host().to_string(),
            port: self.probe_config.port,
        };

        let probe = self.probe.probe(&self.targets, &fallback);
        let result = match settings.max_runtime() {
            Some(budget) => tokio::time::timeout(budget, probe).await.map_err(|_| budget),
            None => Ok(probe.await),
        };

        let outcome = match result {
            Ok(report) => {
                self.observe(Observation::new(
                    PROBE_RUNTIME_KEY,
                    false,
                    format!("probe finished in {}ms", report.duration_ms),
                ))
                .await;
                self.observe(Observation::new(
                    WEB_SERVER_KEY,
                    report.status != HealthStatus::Healthy,
                    report.summary(),
                ))
                .await;

                let status = report.status;
                self.publish_report(report).await;
                CycleOutcome::Completed { status }
            }
            Err(budget) => {
                warn!("probe exceeded runtime budget of {}s", budget.as_secs());
                self.observe(
                    Observation::new(
                        PROBE_RUNTIME_KEY,
                        true,
                        format!(
                            "probe exceeded runtime budget ({}s)",
                            budget.as_secs()
                        ),
                    )
                    .immediate(),
                )
                .await;
                self.status
                    .send_modify(|s| s.last_timeout_at = Some(Utc::now()));
                CycleOutcome::TimedOut {
                    budget_secs: budget.as_secs(),
                }
            }
        };

        self.evaluate_resources(settings).await;
        outcome
    }

    async fn evaluate_resources(&self, settings: &MonitoringSettings) {
        let readings = self.sampler.sample().await;

        for check in readings.evaluate(settings) {
            self.observe(Observation::new(check.key, check.failing, check.describe()))
                .await;
        }

        self.status
            .send_modify(|s| s.last_readings = Some(readings));
    }

    async fn observe(&self, observation: Observation) {
        let key = observation.key.clone();
        if let Err(e) = self.alerts.observe(observation).await {
            error!("evaluation of '{key}' failed: {e}");
        }
    }

    async fn publish_report(&self, report: ServiceHealthReport) {
        if let Some(history) = &self.history {
            if let Err(e) = history
                .insert_report(HealthReportRow::from_report(&report))
                .await
            {
                warn!("could not store health report: {e}");
            }
        }

        info!(
            "health check: {} ({} attempt(s), {}ms)",
            report.status,
            report.attempts.len(),
            report.duration_ms
        );

        match self.events.send(HealthReportEvent {
            report: report.clone(),
            timestamp: Utc::now(),
        }) {
            Ok(receivers) => trace!("published health report to {receivers} receivers"),
            Err(_) => trace!("no receivers for health report (this is OK)"),
        }

        self.status.send_modify(|s| s.last_report = Some(report));
    }

    /// Interval the actor loop should tick at
    pub fn check_interval(&self) -> Duration {
        self.settings.current().check_interval()
    }
}
