//! Local resource sampling.
//!
//! [`SysinfoSampler`] reads CPU and memory on every loop tick and disk usage
//! only when a snapshot asks for it. GPU memory is reported as a placeholder 0
//! until a GPU backend is wired in.

use serde::Serialize;
use sysinfo::{Disks, System};

use crate::error::TelemetryError;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One reading of CPU and memory usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub gpu_memory_percent: f64,
}

/// Space summed over every mounted disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Source of resource readings. Both calls may block; callers run them off
/// the async workers. Errors are reported, never panicked.
pub trait ResourceSampler: Send {
    fn sample(&mut self) -> Result<ResourceSample, TelemetryError>;

    /// Sources without disk figures report zeros.
    fn disk_usage(&mut self) -> Result<DiskUsage, TelemetryError> {
        Ok(DiskUsage::default())
    }
}

pub struct SysinfoSampler {
    system: System,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<ResourceSample, TelemetryError> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let memory_total_bytes = self.system.total_memory();
        if memory_total_bytes == 0 {
            return Err(TelemetryError::Unavailable("total memory reported as 0".into()));
        }
        let memory_used_bytes = self.system.used_memory();

        Ok(ResourceSample {
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            memory_percent: memory_used_bytes as f64 / memory_total_bytes as f64 * 100.0,
            memory_used_bytes,
            memory_total_bytes,
            gpu_memory_percent: 0.0,
        })
    }

    fn disk_usage(&mut self) -> Result<DiskUsage, TelemetryError> {
        // Mounts come and go; reload the list on every call.
        let disks = Disks::new_with_refreshed_list();
        let (total_bytes, available) = disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, avail), d| {
                (total + d.total_space(), avail + d.available_space())
            });
        Ok(DiskUsage {
            used_bytes: total_bytes.saturating_sub(available),
            total_bytes,
        })
    }
}

/// Current system figures as reported in a telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub disk_percent: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
}

impl SystemStats {
    pub fn new(sample: &ResourceSample, disks: DiskUsage) -> Self {
        let disk_percent = if disks.total_bytes > 0 {
            disks.used_bytes as f64 / disks.total_bytes as f64 * 100.0
        } else {
            0.0
        };
        Self {
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            memory_used_gb: sample.memory_used_bytes as f64 / BYTES_PER_GB,
            memory_total_gb: sample.memory_total_bytes as f64 / BYTES_PER_GB,
            disk_percent,
            disk_used_gb: disks.used_bytes as f64 / BYTES_PER_GB,
            disk_total_gb: disks.total_bytes as f64 / BYTES_PER_GB,
        }
    }
}
