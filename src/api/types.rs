//! Request and response bodies of the REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::AlertState;
use crate::monitors::system::MonitorStatus;
use crate::settings::MonitoringSettings;
use crate::storage::HealthReportRow;

/// GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage_healthy: bool,
    pub storage: String,

    /// Backend row counts, absent when the backend could not report them
    pub storage_stats: Option<String>,
}

/// Settings in effect next to what is stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsView {
    pub in_effect: MonitoringSettings,

    /// `None` when the store could not be read
    pub persisted: Option<MonitoringSettings>,

    pub reload_error: Option<String>,
}

/// GET /api/v1/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timestamp: DateTime<Utc>,
    pub monitor: MonitorStatus,
    pub active_alerts: Vec<AlertState>,
    pub settings: SettingsView,
}

/// POST /api/v1/settings/reload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub version: u64,
}

/// PUT /api/v1/lifecycle/{id}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterEntityRequest {
    pub label: String,
    pub recipient: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/v1/lifecycle/{id}/renew
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewRequest {
    pub expires_at: DateTime<Utc>,
}

/// GET /api/v1/reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsResponse {
    pub count: usize,
    pub reports: Vec<HealthReportRow>,
}
