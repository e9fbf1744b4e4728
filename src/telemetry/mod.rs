//! Resource and model-endpoint telemetry.
//!
//! A background loop samples local CPU and memory into a bounded history.
//! Endpoint health is probed on demand when a snapshot is taken. Throughput
//! counters are fed by job workers through [`ThroughputRecorder`]. Recent
//! log events and per-unit tallies are kept in a [`LogBuffer`].

pub mod history;
pub mod logs;
pub mod probe;
pub mod sampler;
pub mod system;
pub mod throughput;

pub use history::{HistorySnapshot, MetricsHistory};
pub use logs::{DEFAULT_LOG_CAPACITY, LogBuffer, LogEntry, LogLayer, UnitCounters};
pub use probe::{EndpointProber, EndpointStatus};
pub use sampler::{DEFAULT_ENDPOINT_NAME, TelemetrySampler, TelemetrySnapshot};
pub use system::{DiskUsage, ResourceSample, ResourceSampler, SysinfoSampler, SystemStats};
pub use throughput::{
    LOCAL_AGGREGATE_NAME, ModelCounters, SpeedComparison, SpeedEntry, ThroughputRecorder,
    ThroughputStats,
};
