//! Fakes and a wired-up hub for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lifeguard::{
    alerts::AlertManager,
    config::ProbeConfig,
    lifecycle::LifecycleScheduler,
    monitors::{
        HealthProbe, SystemMonitor,
        fetch::{FetchOutcome, HttpFetcher},
        port::PortChecker,
        process::{ProcessDescriptor, ProcessInfo, ProcessInspector},
        resources::{MetricsSampler, ResourceReadings},
    },
    notify::{Audience, Notification, NotificationChannel, Notifier, NotifyError},
    settings::{MonitoringSettings, SettingsStore, SettingsUpdate},
    storage::{SettingsBackend, Storage, StorageError, StorageResult},
};

pub const INTERNAL: &str = "http://internal.test:8000/health";
pub const PUBLIC: &str = "https://public.test/health";
pub const LOCAL: &str = "http://127.0.0.1:8000/health";

pub fn probe_config() -> ProbeConfig {
    ProbeConfig {
        internal_url: Some("http://internal.test:8000".to_string()),
        public_url: Some("https://public.test".to_string()),
        loopback_hosts: vec!["127.0.0.1".to_string()],
        port: 8000,
        process: Some(ProcessDescriptor {
            name: "app-server".to_string(),
            cmdline_pattern: None,
        }),
        ..Default::default()
    }
}

/// Answers per URL; unknown URLs behave like a refused connection
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, u16>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl ScriptedFetcher {
    pub fn respond(&self, url: &str, status: u16) {
        self.responses.lock().unwrap().insert(url.to_string(), status);
    }

    pub fn refuse(&self, url: &str) {
        self.responses.lock().unwrap().remove(url);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let status = self.responses.lock().unwrap().get(url).copied();
        match status {
            Some(code) => FetchOutcome {
                status_code: Some(code),
                latency: delay,
                error: None,
            },
            None => FetchOutcome {
                status_code: None,
                latency: delay,
                error: Some("connection refused".to_string()),
            },
        }
    }
}

/// Process / port state toggled by the test
#[derive(Default)]
pub struct Liveness {
    pub process_running: AtomicBool,
    pub port_open: AtomicBool,
}

impl Liveness {
    pub fn set(&self, process_running: bool, port_open: bool) {
        self.process_running.store(process_running, Ordering::SeqCst);
        self.port_open.store(port_open, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessInspector for Liveness {
    async fn is_process_running(&self, _descriptor: &ProcessDescriptor) -> ProcessInfo {
        let running = self.process_running.load(Ordering::SeqCst);
        ProcessInfo {
            running,
            pid: running.then_some(4242),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PortChecker for Liveness {
    async fn is_port_open(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        self.port_open.load(Ordering::SeqCst)
    }
}

pub struct FixedSampler {
    readings: Mutex<(f32, f32, Option<f32>)>,
}

impl Default for FixedSampler {
    fn default() -> Self {
        Self {
            readings: Mutex::new((10.0, 30.0, Some(40.0))),
        }
    }
}

impl FixedSampler {
    pub fn set(&self, cpu: f32, memory: f32, disk: Option<f32>) {
        *self.readings.lock().unwrap() = (cpu, memory, disk);
    }
}

#[async_trait]
impl MetricsSampler for FixedSampler {
    async fn sample(&self) -> ResourceReadings {
        let (cpu_percent, memory_percent, disk_percent) = *self.readings.lock().unwrap();
        ResourceReadings {
            cpu_percent,
            memory_percent,
            disk_percent,
            sampled_at: Utc::now(),
        }
    }
}

/// Channel that keeps what it was asked to send
pub struct RecordingChannel {
    name: String,
    audience: Audience,
    failing: AtomicBool,
    sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn new(name: &str, audience: Audience) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            audience,
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.subject).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn audience(&self) -> Audience {
        self.audience
    }

    fn requires_recipient(&self) -> bool {
        self.audience == Audience::EndUser
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Settings backend whose reads can be made to fail
pub struct FlakySettings {
    inner: Arc<dyn SettingsBackend>,
    pub broken: AtomicBool,
}

impl FlakySettings {
    pub fn new(inner: Arc<dyn SettingsBackend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broken: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SettingsBackend for FlakySettings {
    async fn load_settings(&self) -> StorageResult<Option<MonitoringSettings>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailed("database locked".to_string()));
        }
        self.inner.load_settings().await
    }

    async fn save_settings(&self, settings: &MonitoringSettings) -> StorageResult<()> {
        self.inner.save_settings(settings).await
    }
}

/// Everything the hub wires together, with fakes at the I/O seams
pub struct Harness {
    pub storage: Storage,
    pub settings: Arc<SettingsStore>,
    pub alerts: Arc<AlertManager>,
    pub monitor: Arc<SystemMonitor>,
    pub scheduler: Arc<LifecycleScheduler>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub liveness: Arc<Liveness>,
    pub sampler: Arc<FixedSampler>,
    pub admin: Arc<RecordingChannel>,
    pub mail: Arc<RecordingChannel>,
}

impl Harness {
    pub async fn new(update: SettingsUpdate) -> Self {
        Self::build(Storage::in_memory(), None, update).await
    }

    pub async fn with_storage(storage: Storage, update: SettingsUpdate) -> Self {
        Self::build(storage, None, update).await
    }

    pub async fn with_settings_backend(
        backend: Arc<dyn SettingsBackend>,
        update: SettingsUpdate,
    ) -> Self {
        Self::build(Storage::in_memory(), Some(backend), update).await
    }

    async fn build(
        storage: Storage,
        settings_backend: Option<Arc<dyn SettingsBackend>>,
        update: SettingsUpdate,
    ) -> Self {
        let backend = settings_backend.unwrap_or_else(|| storage.settings.clone());
        let settings = Arc::new(SettingsStore::open(backend).await);
        settings.update(update).await.unwrap();
        settings.reload().await.unwrap();

        let admin = RecordingChannel::new("admin-chat", Audience::Admin);
        let mail = RecordingChannel::new("mail", Audience::EndUser);
        let notifier = Arc::new(Notifier::new(vec![admin.clone(), mail.clone()]));
        let alerts = Arc::new(AlertManager::new(settings.clone(), notifier));

        let fetcher = Arc::new(ScriptedFetcher::default());
        let liveness = Arc::new(Liveness::default());
        let sampler = Arc::new(FixedSampler::default());

        let probe = HealthProbe::new(fetcher.clone(), liveness.clone(), liveness.clone());
        let monitor = Arc::new(
            SystemMonitor::new(
                probe,
                sampler.clone(),
                alerts.clone(),
                settings.clone(),
                probe_config(),
            )
            .with_history(storage.history.clone()),
        );
        let scheduler = Arc::new(LifecycleScheduler::new(
            storage.entities.clone(),
            alerts.clone(),
        ));

        Self {
            storage,
            settings,
            alerts,
            monitor,
            scheduler,
            fetcher,
            liveness,
            sampler,
            admin,
            mail,
        }
    }
}

/// Settings without cooldown or recovery delay, so cycles can run back to back
pub fn fast_settings() -> SettingsUpdate {
    SettingsUpdate {
        cooldown_secs: Some(0),
        recovery_window_secs: Some(0),
        ..Default::default()
    }
}
