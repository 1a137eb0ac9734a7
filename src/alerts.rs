//! AlertManager - per-key alert state, dedup and recovery
//!
//! ## State machine (per key)
//!
//! ```text
//!            failure (count < threshold)
//!   quiet ─────────────────────────────▶ counting
//!     ▲                                     │ count reaches threshold,
//!     │ recovery window elapsed             │ not suppressed
//!     │ without failures                    ▼
//!     └──────────────────────────────── firing ──▶ suppressed until
//!                                                  last fire + dedup window
//! ```
//!
//! Evaluations of one key are strictly sequential (each key has its own
//! lock, held across dispatch); different keys never wait for each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

use crate::notify::{Audience, DispatchReport, Notification, Notifier, Severity};
use crate::settings::{MonitoringSettings, SettingsStore};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert key must not be empty")]
    InvalidKey,

    #[error("invalid alert policy: {0}")]
    InvalidPolicy(String),
}

/// What one evaluation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    None,
    Fired,
    Cleared,
    Suppressed,
}

/// Thresholds and windows one evaluation runs under
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub consecutive_failures_threshold: u32,
    pub dedup_window: TimeDelta,
    pub recovery_window: TimeDelta,
}

impl AlertPolicy {
    pub fn from_settings(settings: &MonitoringSettings) -> Result<Self, AlertError> {
        if settings.consecutive_failures_threshold == 0 {
            return Err(AlertError::InvalidPolicy(
                "consecutive_failures_threshold must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            consecutive_failures_threshold: settings.consecutive_failures_threshold,
            dedup_window: settings.dedup_window(),
            recovery_window: settings.recovery_window(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub key: String,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub suppressed_until: Option<DateTime<Utc>>,
    pub firing: bool,
    pub recovered: bool,

    /// Detail of the most recent failing observation
    pub last_detail: Option<String>,

    /// Channel outcome of the most recent fire / clear notification
    pub last_dispatch: Option<DispatchReport>,
}

impl AlertState {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            consecutive_failures: 0,
            last_failure_at: None,
            last_fired_at: None,
            suppressed_until: None,
            firing: false,
            recovered: false,
            last_detail: None,
            last_dispatch: None,
        }
    }

    pub fn is_suppressed(&self, now: DateTime<Utc>) -> bool {
        self.suppressed_until.is_some_and(|until| now < until)
    }

    /// Apply one observation
    ///
    /// `fire_immediately` lowers the threshold to a single failure; dedup
    /// still applies.
    pub fn record(
        &mut self,
        failing: bool,
        fire_immediately: bool,
        policy: &AlertPolicy,
        now: DateTime<Utc>,
    ) -> AlertAction {
        if failing {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.last_failure_at = Some(now);
            self.recovered = false;

            let threshold = if fire_immediately {
                1
            } else {
                policy.consecutive_failures_threshold
            };

            if self.consecutive_failures < threshold {
                return AlertAction::None;
            }

            if self.is_suppressed(now) {
                return AlertAction::Suppressed;
            }

            self.firing = true;
            self.last_fired_at = Some(now);
            // past the representable range means suppressed for good
            self.suppressed_until = Some(
                now.checked_add_signed(policy.dedup_window)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            return AlertAction::Fired;
        }

        self.consecutive_failures = 0;

        if !self.firing {
            return AlertAction::None;
        }

        let quiet_long_enough = self
            .last_failure_at
            .is_none_or(|last| now - last >= policy.recovery_window);

        if !quiet_long_enough {
            return AlertAction::None;
        }

        // last_fired_at / suppressed_until survive, so a quick relapse
        // cannot fire again inside the same dedup window
        self.firing = false;
        self.recovered = true;
        AlertAction::Cleared
    }

    /// Firing, or failing without having fired yet
    pub fn is_active(&self) -> bool {
        self.firing || self.consecutive_failures > 0
    }
}

/// One condition reported to [`AlertManager::observe`]
#[derive(Debug, Clone)]
pub struct Observation {
    pub key: String,
    pub failing: bool,

    /// Human-readable description used in notifications
    pub detail: String,

    pub fire_immediately: bool,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(key: impl Into<String>, failing: bool, detail: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            failing,
            detail: detail.into(),
            fire_immediately: false,
            observed_at: Utc::now(),
        }
    }

    pub fn immediate(mut self) -> Self {
        self.fire_immediately = true;
        self
    }

    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

pub struct AlertManager {
    settings: Arc<SettingsStore>,
    notifier: Arc<Notifier>,
    admin_recipient: Option<String>,
    states: Mutex<HashMap<String, Arc<Mutex<AlertState>>>>,
}

impl AlertManager {
    pub fn new(settings: Arc<SettingsStore>, notifier: Arc<Notifier>) -> Self {
        Self {
            settings,
            notifier,
            admin_recipient: None,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Address used by admin-audience channels that need a recipient
    pub fn with_admin_recipient(mut self, recipient: Option<String>) -> Self {
        self.admin_recipient = recipient;
        self
    }

    async fn state_for(&self, key: &str) -> Arc<Mutex<AlertState>> {
        let mut states = self.states.lock().await;
        states
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AlertState::new(key))))
            .clone()
    }

    /// Plain evaluation without a detail text
    pub async fn evaluate(&self, key: &str, is_failing: bool) -> Result<AlertAction, AlertError> {
        let detail = if is_failing { "failing" } else { "passing" };
        self.observe(Observation::new(key, is_failing, detail)).await
    }

    #[instrument(skip(self, observation), fields(key = %observation.key, failing = observation.failing))]
    pub async fn observe(&self, observation: Observation) -> Result<AlertAction, AlertError> {
        if observation.key.trim().is_empty() {
            return Err(AlertError::InvalidKey);
        }

        let policy = AlertPolicy::from_settings(&self.settings.current())?;
        let state = self.state_for(&observation.key).await;
        let mut state = state.lock().await;

        if observation.failing {
            state.last_detail = Some(observation.detail.clone());
        }

        let action = state.record(
            observation.failing,
            observation.fire_immediately,
            &policy,
            observation.observed_at,
        );

        let notification = match action {
            AlertAction::Fired => {
                info!(
                    "alert '{}' fired after {} failure(s): {}",
                    observation.key, state.consecutive_failures, observation.detail
                );
                Some(Notification::admin(
                    Severity::Critical,
                    format!("{} failing", observation.key),
                    observation.detail.clone(),
                ))
            }
            AlertAction::Cleared => {
                info!("alert '{}' cleared", observation.key);
                Some(Notification::admin(
                    Severity::Resolved,
                    format!("{} recovered", observation.key),
                    observation.detail.clone(),
                ))
            }
            AlertAction::Suppressed => {
                debug!(
                    "alert '{}' suppressed ({} consecutive failures)",
                    observation.key, state.consecutive_failures
                );
                None
            }
            AlertAction::None => {
                trace!("alert '{}' unchanged", observation.key);
                None
            }
        };

        if let Some(notification) = notification {
            state.last_dispatch = Some(self.notify(notification).await);
        }

        Ok(action)
    }

    /// Route an arbitrary notification through the configured channels
    pub async fn notify(&self, notification: Notification) -> DispatchReport {
        let notification = match notification.audience {
            Audience::Admin => notification.with_recipient(self.admin_recipient.clone()),
            Audience::EndUser => notification,
        };
        self.notifier.dispatch(&notification).await
    }

    pub async fn state(&self, key: &str) -> Option<AlertState> {
        let state = self.states.lock().await.get(key).cloned()?;
        let state = state.lock().await;
        Some(state.clone())
    }

    /// Keys that are firing or currently counting failures
    pub async fn active_alerts(&self) -> Vec<AlertState> {
        let states: Vec<_> = self.states.lock().await.values().cloned().collect();

        let mut active = Vec::new();
        for state in states {
            let state = state.lock().await;
            if state.is_active() {
                active.push(state.clone());
            }
        }
        active.sort_by(|a, b| a.key.cmp(&b.key));
        active
    }
}
