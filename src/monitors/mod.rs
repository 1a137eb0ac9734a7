//! Health and resource monitoring
//!
//! - [`probe`]: prioritized HTTP health checks with process/port fallback
//! - [`resources`]: CPU, memory and disk sampling
//! - [`system`]: one guarded monitoring cycle feeding the alert manager
//!
//! The capability traits ([`fetch::HttpFetcher`], [`process::ProcessInspector`],
//! [`port::PortChecker`], [`resources::MetricsSampler`]) keep the probe logic
//! independent from real I/O.

pub mod fetch;
pub mod port;
pub mod probe;
pub mod process;
pub mod resources;
pub mod system;

pub use probe::{HealthProbe, HealthStatus, ServiceHealthReport};
pub use system::{CycleOutcome, MonitorStatus, SystemMonitor};
