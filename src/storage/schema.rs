//! Stored row definitions
//!
//! Health history uses the same hybrid approach as a metrics table: the
//! fields dashboards filter on are typed columns, the full report is kept
//! as JSON next to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitors::probe::{HealthStatus, ServiceHealthReport};

/// One completed monitoring cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReportRow {
    /// When the probe finished (always UTC)
    pub checked_at: DateTime<Utc>,

    /// Derived service status
    pub status: HealthStatus,

    /// URL of the attempt that succeeded, if any
    pub successful_target: Option<String>,

    /// Number of recorded attempts
    pub attempt_count: usize,

    /// Wall time of the whole probe
    pub duration_ms: u64,

    /// Complete report, serialized to JSON only when written to a database
    pub report: ServiceHealthReport,
}

impl HealthReportRow {
    pub fn from_report(report: &ServiceHealthReport) -> Self {
        Self {
            checked_at: report.checked_at,
            status: report.status,
            successful_target: report.successful_target.as_ref().map(|t| t.url.clone()),
            attempt_count: report.attempts.len(),
            duration_ms: report.duration_ms,
            report: report.clone(),
        }
    }
}
