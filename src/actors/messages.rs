//! Message types for actor communication
//!
//! 1. **Commands**: Request/response messages sent to a specific actor via mpsc
//! 2. **Events**: Broadcast notifications published to any number of subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::lifecycle::ScanSummary;
use crate::monitors::probe::ServiceHealthReport;
use crate::monitors::system::CycleOutcome;

/// Event published whenever a monitoring cycle produced a health report
///
/// Slow subscribers may lag and miss reports; the next cycle produces a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReportEvent {
    pub report: ServiceHealthReport,
    pub timestamp: DateTime<Utc>,
}

/// Commands for the monitor actor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a cycle now, subject to the same single-flight and cooldown guards
    RunNow {
        respond_to: oneshot::Sender<CycleOutcome>,
    },

    /// Re-read settings from storage and re-arm the ticker if the interval changed
    ReloadSettings {
        /// Version now in effect, or the reload error
        respond_to: oneshot::Sender<Result<u64, String>>,
    },

    /// Stop ticking; a cycle already running finishes on its own
    Shutdown,
}

/// Commands for the lifecycle actor
#[derive(Debug)]
pub enum LifecycleCommand {
    /// Scan all entities immediately
    ScanNow {
        respond_to: oneshot::Sender<Result<ScanSummary, String>>,
    },

    Shutdown,
}
