//! Background telemetry loop and snapshot assembly.
//!
//! One sampling task per [`TelemetrySampler`]. Starting an already running
//! sampler is a no-op; stopping waits for the task to exit. A failed sample is
//! logged and retried after the configured backoff, the loop never dies from a
//! sampling error. Resource reads block, so they run on the blocking pool and
//! never on the runtime's async workers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::history::{HistorySnapshot, MetricsHistory};
use super::probe::{EndpointProber, EndpointStatus};
use super::system::{ResourceSampler, SysinfoSampler, SystemStats};
use super::throughput::{SpeedComparison, ThroughputRecorder, ThroughputStats};
use crate::config::TelemetryConfig;
use crate::error::TelemetryError;

/// Name under which the configured default endpoint is probed when nothing
/// has been registered.
pub const DEFAULT_ENDPOINT_NAME: &str = "default";

type SharedSource = Arc<Mutex<Box<dyn ResourceSampler>>>;

/// Everything a dashboard needs in one read.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    /// `None` when the system figures could not be read.
    pub system: Option<SystemStats>,
    /// The endpoints that were probed, so always the keys of `status`.
    pub endpoints: IndexMap<String, String>,
    pub status: IndexMap<String, EndpointStatus>,
    pub throughput: ThroughputStats,
    pub history: HistorySnapshot,
}

struct SamplerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct TelemetrySampler {
    config: TelemetryConfig,
    source: SharedSource,
    history: Arc<Mutex<MetricsHistory>>,
    endpoints: Mutex<IndexMap<String, String>>,
    throughput: Arc<ThroughputRecorder>,
    prober: EndpointProber,
    task: tokio::sync::Mutex<Option<SamplerTask>>,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `read` against the source on the blocking pool.
async fn read_source<T, F>(source: &SharedSource, read: F) -> Result<T, TelemetryError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn ResourceSampler) -> Result<T, TelemetryError> + Send + 'static,
{
    let source = source.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = lock(&source);
        read(&mut **guard)
    })
    .await
    .map_err(|e| TelemetryError::Unavailable(format!("sampling task failed: {e}")))?
}

impl TelemetrySampler {
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        Self::with_source(config, Box::new(SysinfoSampler::new()))
    }

    pub fn with_source(
        config: TelemetryConfig,
        source: Box<dyn ResourceSampler>,
    ) -> Result<Self, TelemetryError> {
        let prober = EndpointProber::new(config.probe_timeout())
            .map_err(|e| TelemetryError::Client(e.to_string()))?;
        Ok(Self {
            history: Arc::new(Mutex::new(MetricsHistory::new(config.history_capacity))),
            source: Arc::new(Mutex::new(source)),
            endpoints: Mutex::new(IndexMap::new()),
            throughput: Arc::new(ThroughputRecorder::new()),
            prober,
            task: tokio::sync::Mutex::new(None),
            config,
        })
    }

    /// Shared throughput accumulator, handed to job workers.
    pub fn throughput(&self) -> Arc<ThroughputRecorder> {
        self.throughput.clone()
    }

    /// Start the sampling loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if let Some(existing) = task.as_ref() {
            if !existing.handle.is_finished() {
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sample_loop(
            self.source.clone(),
            self.history.clone(),
            self.config.sample_interval(),
            self.config.error_backoff(),
            cancel.clone(),
        ));
        *task = Some(SamplerTask { cancel, handle });
        tracing::info!(
            interval_ms = self.config.sample_interval_ms,
            "Telemetry sampler started"
        );
        true
    }

    /// Stop the loop and wait for it to exit. Returns `false` if it was not
    /// running.
    pub async fn stop(&self) -> bool {
        let Some(SamplerTask { cancel, handle }) = self.task.lock().await.take() else {
            return false;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Telemetry sampler task ended abnormally");
        }
        tracing::info!("Telemetry sampler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Register or replace an endpoint. Re-registering a name keeps its
    /// original position.
    pub fn register_endpoint(&self, name: impl Into<String>, url: impl Into<String>) {
        let (name, url) = (name.into(), url.into());
        tracing::debug!(name = %name, url = %url, "Registered endpoint");
        lock(&self.endpoints).insert(name, url);
    }

    pub fn endpoints(&self) -> IndexMap<String, String> {
        lock(&self.endpoints).clone()
    }

    pub fn history(&self) -> HistorySnapshot {
        lock(&self.history).snapshot()
    }

    pub fn record_translation(
        &self,
        model: &str,
        tokens_generated: u64,
        time_taken_secs: f64,
        is_local: bool,
    ) {
        self.throughput
            .record(model, tokens_generated, time_taken_secs, is_local);
    }

    pub fn comparison(&self) -> SpeedComparison {
        self.throughput.comparison()
    }

    /// Registered endpoints, or the configured default endpoint when none are.
    fn probe_targets(&self) -> IndexMap<String, String> {
        let mut endpoints = self.endpoints();
        if endpoints.is_empty() {
            if let Some(url) = &self.config.default_endpoint {
                endpoints.insert(DEFAULT_ENDPOINT_NAME.to_string(), url.clone());
            }
        }
        endpoints
    }

    async fn probe_all(
        &self,
        endpoints: &IndexMap<String, String>,
    ) -> IndexMap<String, EndpointStatus> {
        let checks = endpoints.values().map(|url| self.prober.check(url));
        let results = join_all(checks).await;
        endpoints.keys().cloned().zip(results).collect()
    }

    /// Probe every endpoint concurrently. Falls back to the configured default
    /// endpoint when none are registered.
    pub async fn probe_endpoints(&self) -> IndexMap<String, EndpointStatus> {
        let endpoints = self.probe_targets();
        self.probe_all(&endpoints).await
    }

    pub async fn snapshot(&self) -> TelemetrySnapshot {
        let read = read_source(&self.source, |source| {
            let sample = source.sample()?;
            let disks = source.disk_usage()?;
            Ok(SystemStats::new(&sample, disks))
        })
        .await;
        let system = match read {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "System stats unavailable for snapshot");
                None
            }
        };

        let endpoints = self.probe_targets();
        let status = self.probe_all(&endpoints).await;

        TelemetrySnapshot {
            timestamp: Utc::now(),
            system,
            endpoints,
            status,
            throughput: self.throughput.snapshot(),
            history: self.history(),
        }
    }
}

async fn sample_loop(
    source: SharedSource,
    history: Arc<Mutex<MetricsHistory>>,
    interval: Duration,
    backoff: Duration,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_source(&source, |source| source.sample()) => result,
        };
        let delay = match result {
            Ok(sample) => {
                lock(&history).push(Utc::now(), &sample);
                tracing::debug!(
                    cpu = sample.cpu_percent,
                    memory = sample.memory_percent,
                    "Resource sample"
                );
                interval
            }
            Err(e) => {
                tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "Resource sampling failed");
                backoff
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
