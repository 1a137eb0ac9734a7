//! Process-liveness check

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};
use tracing::{instrument, trace, warn};

/// Identifies the server process the probe expects to find
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    /// Executable name, e.g. `gunicorn`
    pub name: String,

    /// Optional regex the joined command line must match
    #[serde(default)]
    pub cmdline_pattern: Option<String>,
}

/// What the process check found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub running: bool,
    pub pid: Option<u32>,
    pub cpu_percent: Option<f32>,
    pub memory_bytes: Option<u64>,
}

#[async_trait]
pub trait ProcessInspector: Send + Sync {
    async fn is_process_running(&self, descriptor: &ProcessDescriptor) -> ProcessInfo;
}

/// Looks the process up in the local process table
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoInspector;

#[async_trait]
impl ProcessInspector for SysinfoInspector {
    #[instrument(skip(self))]
    async fn is_process_running(&self, descriptor: &ProcessDescriptor) -> ProcessInfo {
        let descriptor = descriptor.clone();
        match tokio::task::spawn_blocking(move || inspect(&descriptor)).await {
            Ok(info) => info,
            Err(e) => {
                warn!("process inspection task failed: {e}");
                ProcessInfo::default()
            }
        }
    }
}

fn inspect(descriptor: &ProcessDescriptor) -> ProcessInfo {
    let pattern = match descriptor.cmdline_pattern.as_deref().map(Regex::new).transpose() {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!("invalid cmdline pattern for '{}': {e}", descriptor.name);
            return ProcessInfo::default();
        }
    };

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let found = sys.processes().iter().find(|(_, process)| {
        let name = process.name().to_string_lossy();
        let cmdline = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        descriptor_matches(descriptor, pattern.as_ref(), &name, &cmdline)
    });

    match found {
        Some((pid, process)) => {
            trace!("found '{}' as pid {pid}", descriptor.name);
            ProcessInfo {
                running: true,
                pid: Some(pid.as_u32()),
                cpu_percent: Some(process.cpu_usage()),
                memory_bytes: Some(process.memory()),
            }
        }
        None => ProcessInfo::default(),
    }
}

fn descriptor_matches(
    descriptor: &ProcessDescriptor,
    pattern: Option<&Regex>,
    name: &str,
    cmdline: &str,
) -> bool {
    if name != descriptor.name {
        return false;
    }
    pattern.is_none_or(|re| re.is_match(cmdline))
}
