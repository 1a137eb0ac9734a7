//! API shared state containing actor handles

use std::sync::Arc;

use crate::actors::{LifecycleHandle, MonitorHandle};
use crate::alerts::AlertManager;
use crate::lifecycle::LifecycleScheduler;
use crate::settings::SettingsStore;
use crate::storage::{ReportHistory, StorageBackend};

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub monitor: MonitorHandle,
    pub lifecycle: LifecycleHandle,

    /// Backend health, reported by `/health`
    pub backend: Arc<dyn StorageBackend>,
    pub history: Arc<dyn ReportHistory>,
}

impl ApiState {
    pub fn new(
        monitor: MonitorHandle,
        lifecycle: LifecycleHandle,
        backend: Arc<dyn StorageBackend>,
        history: Arc<dyn ReportHistory>,
    ) -> Self {
        Self {
            monitor,
            lifecycle,
            backend,
            history,
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        self.monitor.monitor().settings()
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        self.monitor.monitor().alerts()
    }

    pub fn scheduler(&self) -> &Arc<LifecycleScheduler> {
        self.lifecycle.scheduler()
    }
}
