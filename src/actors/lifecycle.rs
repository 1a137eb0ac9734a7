//! LifecycleActor - periodic lifecycle scans
//!
//! Scans run inline: a scan is idempotent and a new tick never starts while
//! the previous scan is still running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, warn};

use super::messages::LifecycleCommand;
use crate::lifecycle::{LifecycleScheduler, ScanSummary};
use crate::settings::SettingsStore;

pub struct LifecycleActor {
    scheduler: Arc<LifecycleScheduler>,
    settings: Arc<SettingsStore>,
    command_rx: mpsc::Receiver<LifecycleCommand>,
    interval_duration: Duration,
}

impl LifecycleActor {
    pub fn new(
        scheduler: Arc<LifecycleScheduler>,
        settings: Arc<SettingsStore>,
        command_rx: mpsc::Receiver<LifecycleCommand>,
    ) -> Self {
        let interval_duration = settings.current().lifecycle_scan_interval();
        Self {
            scheduler,
            settings,
            command_rx,
            interval_duration,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting lifecycle actor");

        let mut ticker = interval_at(Instant::now(), self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scheduler.scan().await {
                        error!("lifecycle scan failed: {e}");
                    }

                    let configured = self.settings.current().lifecycle_scan_interval();
                    if configured != self.interval_duration {
                        match Instant::now().checked_add(configured) {
                            Some(start) => {
                                info!("lifecycle scan interval changed to {}s", configured.as_secs());
                                self.interval_duration = configured;
                                ticker = interval_at(start, configured);
                                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            }
                            None => warn!(
                                "lifecycle scan interval of {}s is out of range, keeping {}s",
                                configured.as_secs(),
                                self.interval_duration.as_secs()
                            ),
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        LifecycleCommand::ScanNow { respond_to } => {
                            debug!("received ScanNow command");
                            let result = self.scheduler.scan().await.map_err(|e| e.to_string());
                            let _ = respond_to.send(result);
                        }

                        LifecycleCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("lifecycle actor stopped");
    }
}

/// Handle for controlling a LifecycleActor
#[derive(Clone)]
pub struct LifecycleHandle {
    sender: mpsc::Sender<LifecycleCommand>,
    scheduler: Arc<LifecycleScheduler>,
}

impl LifecycleHandle {
    pub fn spawn(scheduler: Arc<LifecycleScheduler>, settings: Arc<SettingsStore>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = LifecycleActor::new(scheduler.clone(), settings, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            scheduler,
        }
    }

    pub async fn scan_now(&self) -> Result<ScanSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LifecycleCommand::ScanNow { respond_to: tx })
            .await
            .context("failed to send ScanNow command")?;

        rx.await
            .context("failed to receive scan summary")?
            .map_err(|e| anyhow!("lifecycle scan failed: {e}"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LifecycleCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    pub fn scheduler(&self) -> &Arc<LifecycleScheduler> {
        &self.scheduler
    }
}
