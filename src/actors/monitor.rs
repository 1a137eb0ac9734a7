//! MonitorActor - drives the SystemMonitor on its check interval
//!
//! ```text
//! Timer tick ─▶ spawn SystemMonitor::run_cycle ─▶ [HealthReportEvent, alerts, history]
//!     ↑
//!     └─── Commands (RunNow, ReloadSettings, Shutdown)
//! ```
//!
//! Cycles run on their own task so a slow probe never stalls the command
//! loop; overlapping ticks are rejected by the monitor's single-flight guard.
//! A finished cycle reports back so an interval picked up by its reload
//! re-arms the ticker before the next tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, instrument, warn};

use super::messages::MonitorCommand;
use crate::monitors::system::{CycleOutcome, SystemMonitor};
use crate::storage::ReportHistory;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long stored health reports are kept
#[derive(Clone)]
pub struct RetentionPolicy {
    pub history: Arc<dyn ReportHistory>,
    pub keep: TimeDelta,
}

pub struct MonitorActor {
    monitor: Arc<SystemMonitor>,
    command_rx: mpsc::Receiver<MonitorCommand>,
    retention: Option<RetentionPolicy>,

    /// Interval the ticker is currently armed with
    interval_duration: Duration,
}

impl MonitorActor {
    pub fn new(
        monitor: Arc<SystemMonitor>,
        command_rx: mpsc::Receiver<MonitorCommand>,
        retention: Option<RetentionPolicy>,
    ) -> Self {
        let interval_duration = monitor.check_interval();
        Self {
            monitor,
            command_rx,
            retention,
            interval_duration,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting monitor actor");

        let mut ticker = armed_ticker(self.interval_duration, Instant::now());
        let mut cleanup = interval(CLEANUP_INTERVAL);
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let monitor = self.monitor.clone();
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        monitor.run_cycle().await;
                        let _ = done.try_send(());
                    });
                }

                Some(()) = done_rx.recv() => {
                    self.rearm_if_changed(&mut ticker);
                }

                _ = cleanup.tick(), if self.retention.is_some() => {
                    self.cleanup_history().await;
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        MonitorCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let monitor = self.monitor.clone();
                            let done = done_tx.clone();
                            tokio::spawn(async move {
                                let _ = respond_to.send(monitor.run_cycle().await);
                                let _ = done.try_send(());
                            });
                        }

                        MonitorCommand::ReloadSettings { respond_to } => {
                            debug!("received ReloadSettings command");
                            let result = self
                                .monitor
                                .settings()
                                .reload()
                                .await
                                .map(|settings| settings.version)
                                .map_err(|e| e.to_string());
                            self.rearm_if_changed(&mut ticker);
                            let _ = respond_to.send(result);
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("monitor actor stopped");
    }

    /// Re-create the ticker when the configured interval differs from the armed one
    fn rearm_if_changed(&mut self, ticker: &mut Interval) {
        let configured = self.monitor.check_interval();
        if configured == self.interval_duration {
            return;
        }

        let Some(start) = Instant::now().checked_add(configured) else {
            warn!(
                "check interval of {}s is out of range, keeping {}s",
                configured.as_secs(),
                self.interval_duration.as_secs()
            );
            return;
        };

        info!(
            "check interval changed from {}s to {}s",
            self.interval_duration.as_secs(),
            configured.as_secs()
        );
        self.interval_duration = configured;
        *ticker = armed_ticker(configured, start);
    }

    async fn cleanup_history(&self) {
        let Some(retention) = &self.retention else {
            return;
        };

        let before = Utc::now() - retention.keep;
        match retention.history.cleanup_old_reports(before).await {
            Ok(0) => debug!("no health reports older than {before}"),
            Ok(deleted) => info!("removed {deleted} health reports older than {before}"),
            Err(e) => warn!("health report cleanup failed: {e}"),
        }
    }
}

fn armed_ticker(period: Duration, start: Instant) -> Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Handle for controlling a MonitorActor
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
    monitor: Arc<SystemMonitor>,
}

impl MonitorHandle {
    pub fn spawn(monitor: Arc<SystemMonitor>, retention: Option<RetentionPolicy>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = MonitorActor::new(monitor.clone(), cmd_rx, retention);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            monitor,
        }
    }

    /// Run a cycle immediately and wait for its outcome
    pub async fn run_now(&self) -> Result<CycleOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive cycle outcome")
    }

    /// Reload settings, returning the version now in effect
    pub async fn reload_settings(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::ReloadSettings { respond_to: tx })
            .await
            .context("failed to send ReloadSettings command")?;

        rx.await
            .context("failed to receive reload result")?
            .map_err(|e| anyhow!("settings reload failed: {e}"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    pub fn monitor(&self) -> &Arc<SystemMonitor> {
        &self.monitor
    }
}
