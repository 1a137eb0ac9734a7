//! SettingsStore - persisted, hot-reloadable monitoring settings
//!
//! Readers never see a half-written record: the in-effect settings are an
//! immutable [`MonitoringSettings`] behind an [`ArcSwap`], and a reload
//! replaces the whole `Arc` at once. Updates are serialized by a lock and
//! go to the backend only; they take effect with the next reload.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::storage::{SettingsBackend, StorageError};
use crate::util::secs_delta;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Upper bound for every interval, window and budget: one year
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Thresholds, intervals and windows for the monitoring core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub cpu_threshold_percent: f32,
    pub memory_threshold_percent: f32,
    pub disk_threshold_percent: f32,

    /// Nominal time between two monitoring cycles
    pub check_interval_secs: u64,

    /// Failing evaluations in a row before a key may fire
    pub consecutive_failures_threshold: u32,

    /// Minimum time between two firings of the same key
    pub dedup_window_secs: u64,

    /// Minimum time between the end of one cycle and the start of the next
    pub cooldown_secs: u64,

    /// Probe runtime budget, `None` means unlimited
    pub max_runtime_secs: Option<u64>,

    /// Failure-free time needed before a firing key clears
    pub recovery_window_secs: u64,

    /// Timeout of a single probe attempt
    pub attempt_timeout_secs: u64,

    pub lifecycle_scan_interval_secs: u64,

    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            cpu_threshold_percent: 90.0,
            memory_threshold_percent: 90.0,
            disk_threshold_percent: 90.0,
            check_interval_secs: 60,
            consecutive_failures_threshold: 3,
            dedup_window_secs: 1800,
            cooldown_secs: 30,
            max_runtime_secs: Some(120),
            recovery_window_secs: 300,
            attempt_timeout_secs: 10,
            lifecycle_scan_interval_secs: 3600,
            version: 0,
            updated_at: None,
        }
    }
}

impl MonitoringSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime_secs.map(Duration::from_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn lifecycle_scan_interval(&self) -> Duration {
        Duration::from_secs(self.lifecycle_scan_interval_secs)
    }

    pub fn dedup_window(&self) -> TimeDelta {
        secs_delta(self.dedup_window_secs)
    }

    pub fn recovery_window(&self) -> TimeDelta {
        secs_delta(self.recovery_window_secs)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("cpu_threshold_percent", self.cpu_threshold_percent),
            ("memory_threshold_percent", self.memory_threshold_percent),
            ("disk_threshold_percent", self.disk_threshold_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(SettingsError::Invalid(format!(
                    "{name} must be in (0, 100], got {value}"
                )));
            }
        }

        for (name, value) in [
            ("check_interval_secs", self.check_interval_secs),
            ("attempt_timeout_secs", self.attempt_timeout_secs),
            (
                "lifecycle_scan_interval_secs",
                self.lifecycle_scan_interval_secs,
            ),
        ] {
            if value == 0 {
                return Err(SettingsError::Invalid(format!("{name} must be positive")));
            }
        }

        for (name, value) in [
            ("check_interval_secs", self.check_interval_secs),
            ("attempt_timeout_secs", self.attempt_timeout_secs),
            (
                "lifecycle_scan_interval_secs",
                self.lifecycle_scan_interval_secs,
            ),
            ("dedup_window_secs", self.dedup_window_secs),
            ("cooldown_secs", self.cooldown_secs),
            ("recovery_window_secs", self.recovery_window_secs),
            ("max_runtime_secs", self.max_runtime_secs.unwrap_or(0)),
        ] {
            if value > MAX_DURATION_SECS {
                return Err(SettingsError::Invalid(format!(
                    "{name} must be at most {MAX_DURATION_SECS}, got {value}"
                )));
            }
        }

        if self.consecutive_failures_threshold == 0 {
            return Err(SettingsError::Invalid(
                "consecutive_failures_threshold must be at least 1".to_string(),
            ));
        }

        if self.max_runtime_secs == Some(0) {
            return Err(SettingsError::Invalid(
                "max_runtime_secs must be positive or null".to_string(),
            ));
        }

        Ok(())
    }

    /// New settings value with `update` applied and the version bumped
    pub fn apply(&self, update: SettingsUpdate, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = update.$field {
                    next.$field = value;
                })*
            };
        }

        merge!(
            cpu_threshold_percent,
            memory_threshold_percent,
            disk_threshold_percent,
            check_interval_secs,
            consecutive_failures_threshold,
            dedup_window_secs,
            cooldown_secs,
            max_runtime_secs,
            recovery_window_secs,
            attempt_timeout_secs,
            lifecycle_scan_interval_secs,
        );

        next.version = self.version + 1;
        next.updated_at = Some(now);
        next
    }
}

/// Partial update; absent fields keep their persisted value
///
/// `max_runtime_secs` distinguishes "absent" from an explicit `null`, which
/// removes the runtime limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub cpu_threshold_percent: Option<f32>,
    pub memory_threshold_percent: Option<f32>,
    pub disk_threshold_percent: Option<f32>,
    pub check_interval_secs: Option<u64>,
    pub consecutive_failures_threshold: Option<u32>,
    pub dedup_window_secs: Option<u64>,
    pub cooldown_secs: Option<u64>,
    #[serde(
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_runtime_secs: Option<Option<u64>>,
    pub recovery_window_secs: Option<u64>,
    pub attempt_timeout_secs: Option<u64>,
    pub lifecycle_scan_interval_secs: Option<u64>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Owner of the persisted and the in-effect settings
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    current: ArcSwap<MonitoringSettings>,
    last_error: ArcSwapOption<String>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Load the persisted settings, seeding defaults on first run
    ///
    /// Never fails: an unreadable backend leaves the defaults in effect and
    /// the error visible through [`last_reload_error`](Self::last_reload_error).
    #[instrument(skip_all)]
    pub async fn open(backend: Arc<dyn SettingsBackend>) -> Self {
        let store = Self {
            backend,
            current: ArcSwap::from_pointee(MonitoringSettings::default()),
            last_error: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        };

        match store.backend.load_settings().await {
            Ok(Some(settings)) => match settings.validate() {
                Ok(()) => {
                    debug!("loaded persisted settings version {}", settings.version);
                    store.current.store(Arc::new(settings));
                }
                Err(e) => {
                    warn!("persisted settings rejected, running with defaults: {e}");
                    store.last_error.store(Some(Arc::new(e.to_string())));
                }
            },
            Ok(None) => {
                let seeded = MonitoringSettings {
                    updated_at: Some(Utc::now()),
                    ..MonitoringSettings::default()
                };
                match store.backend.save_settings(&seeded).await {
                    Ok(()) => info!("seeded default monitoring settings"),
                    Err(e) => warn!("could not seed default settings: {e}"),
                }
                store.current.store(Arc::new(seeded));
            }
            Err(e) => {
                warn!("settings unreadable, running with defaults: {e}");
                store.last_error.store(Some(Arc::new(e.to_string())));
            }
        }

        store
    }

    /// Snapshot of the settings in effect
    pub fn current(&self) -> Arc<MonitoringSettings> {
        self.current.load_full()
    }

    /// The record as currently persisted, which may be newer than `current`
    pub async fn persisted(&self) -> Result<MonitoringSettings, SettingsError> {
        Ok(self.backend.load_settings().await?.unwrap_or_default())
    }

    /// Swap in the persisted settings
    ///
    /// On failure the previous snapshot stays in effect and the error is
    /// returned as well as remembered for the status snapshot.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<Arc<MonitoringSettings>, SettingsError> {
        let loaded = match self.backend.load_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => MonitoringSettings::default(),
            Err(e) => {
                warn!("settings reload failed, keeping previous snapshot: {e}");
                self.last_error.store(Some(Arc::new(e.to_string())));
                return Err(e.into());
            }
        };

        if let Err(e) = loaded.validate() {
            warn!("persisted settings rejected, keeping previous snapshot: {e}");
            self.last_error.store(Some(Arc::new(e.to_string())));
            return Err(e);
        }

        let loaded = Arc::new(loaded);
        let previous = self.current.swap(loaded.clone());
        self.last_error.store(None);

        if previous.version != loaded.version {
            info!(
                "settings reloaded: version {} -> {}",
                previous.version, loaded.version
            );
        }

        Ok(loaded)
    }

    /// Persist a partial update; picked up by the next reload
    #[instrument(skip(self))]
    pub async fn update(&self, update: SettingsUpdate) -> Result<MonitoringSettings, SettingsError> {
        let _guard = self.write_lock.lock().await;

        let persisted = self.backend.load_settings().await?.unwrap_or_default();
        let next = persisted.apply(update, Utc::now());
        next.validate()?;

        self.backend.save_settings(&next).await?;
        info!("settings updated to version {}", next.version);

        Ok(next)
    }

    /// Error of the most recent failed load, cleared by a successful reload
    pub fn last_reload_error(&self) -> Option<String> {
        self.last_error.load_full().map(|e| e.as_ref().clone())
    }
}
