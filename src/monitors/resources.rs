//! CPU / memory / disk sampling and threshold checks
//!
//! Each resource is an independent alert key: `cpu`, `memory`, `disk`.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, MINIMUM_CPU_UPDATE_INTERVAL, System};
use tracing::{instrument, trace};

use crate::settings::MonitoringSettings;

/// One sample of host resource usage, all values in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReadings {
    pub cpu_percent: f32,
    pub memory_percent: f32,

    /// Usage of the root filesystem, `None` if no disk could be read
    pub disk_percent: Option<f32>,

    pub sampled_at: DateTime<Utc>,
}

/// Outcome of comparing one reading against its threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceCheck {
    pub key: &'static str,
    pub value: f32,
    pub threshold: f32,
    pub failing: bool,
}

impl ResourceCheck {
    fn new(key: &'static str, value: f32, threshold: f32) -> Self {
        Self {
            key,
            value,
            threshold,
            failing: value >= threshold,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} usage at {:.1}% (threshold {:.1}%)",
            self.key, self.value, self.threshold
        )
    }
}

impl ResourceReadings {
    /// Compare every available reading with the configured thresholds
    pub fn evaluate(&self, settings: &MonitoringSettings) -> Vec<ResourceCheck> {
        let mut checks = vec![
            ResourceCheck::new("cpu", self.cpu_percent, settings.cpu_threshold_percent),
            ResourceCheck::new(
                "memory",
                self.memory_percent,
                settings.memory_threshold_percent,
            ),
        ];

        if let Some(disk) = self.disk_percent {
            checks.push(ResourceCheck::new(
                "disk",
                disk,
                settings.disk_threshold_percent,
            ));
        }

        checks
    }
}

#[async_trait]
pub trait MetricsSampler: Send + Sync {
    async fn sample(&self) -> ResourceReadings;
}

/// Samples the local host through sysinfo
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoSampler;

#[async_trait]
impl MetricsSampler for SysinfoSampler {
    #[instrument(skip(self))]
    async fn sample(&self) -> ResourceReadings {
        let mut sys = System::new();

        // cpu usage is a delta between two refreshes
        sys.refresh_cpu_usage();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let memory_percent = percent(sys.used_memory(), sys.total_memory());
        let disk_percent = root_disk_usage();

        let readings = ResourceReadings {
            cpu_percent: sys.global_cpu_usage(),
            memory_percent,
            disk_percent,
            sampled_at: Utc::now(),
        };
        trace!("sampled resources: {readings:?}");
        readings
    }
}

fn root_disk_usage() -> Option<f32> {
    let disks = Disks::new_with_refreshed_list();

    let root = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"));

    match root {
        Some(disk) => Some(percent(
            disk.total_space().saturating_sub(disk.available_space()),
            disk.total_space(),
        )),
        None => {
            let (used, total) = disks.list().iter().fold((0u64, 0u64), |(used, total), d| {
                (
                    used + d.total_space().saturating_sub(d.available_space()),
                    total + d.total_space(),
                )
            });
            (total > 0).then(|| percent(used, total))
        }
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0) as f32
}
