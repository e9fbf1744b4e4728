//! Job lifecycle entry point.
//!
//! [`JobManager`] creates jobs, runs each one on its own task and routes
//! pause/resume/terminate commands to the running worker. Every worker runs
//! under a supervising task that marks the job failed if the worker panics and
//! always removes the job's control entry afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::control::ControlRegistry;
use super::record::{JobRecord, UnitResult};
use super::state::JobStatus;
use super::worker::JobWorker;
use crate::backend::{Evaluator, Translator};
use crate::data::TranslationPair;
use crate::error::{ControlCommand, ControlError, EvalError};
use crate::report::{ModelPerformance, model_statistics};
use crate::store::JobStore;
use crate::telemetry::{LogBuffer, LogEntry, ThroughputRecorder, UnitCounters};

/// Status of one job as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    #[serde(flatten)]
    pub record: JobRecord,
    pub results_count: usize,
    /// Per-model averages, only once the job has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_statistics: Option<BTreeMap<String, ModelPerformance>>,
    /// Started/completed/failed units per model. Empty without a log buffer.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unit_counters: BTreeMap<String, UnitCounters>,
}

pub struct JobManager {
    store: Arc<dyn JobStore>,
    translator: Arc<dyn Translator>,
    evaluator: Arc<dyn Evaluator>,
    throughput: Arc<ThroughputRecorder>,
    controls: Arc<ControlRegistry>,
    output_dir: PathBuf,
    tracker: TaskTracker,
    logs: Option<Arc<LogBuffer>>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        translator: Arc<dyn Translator>,
        evaluator: Arc<dyn Evaluator>,
        throughput: Arc<ThroughputRecorder>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            translator,
            evaluator,
            throughput,
            controls: Arc::new(ControlRegistry::new()),
            output_dir: output_dir.into(),
            tracker: TaskTracker::new(),
            logs: None,
        }
    }

    /// Read unit counters and job logs from `logs`. The buffer only fills if
    /// its layer is installed in the active subscriber.
    pub fn with_logs(mut self, logs: Arc<LogBuffer>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    /// Persist a new pending job and start its worker. Returns immediately.
    pub async fn create_job(
        &self,
        name: impl Into<String>,
        items: Vec<TranslationPair>,
        models: Vec<String>,
        input_artifact: Option<String>,
    ) -> Result<Uuid, EvalError> {
        if items.is_empty() {
            return Err(EvalError::EmptyWorkItems);
        }
        if models.is_empty() {
            return Err(EvalError::NoModelsSelected);
        }

        let record =
            JobRecord::new(name.into(), items.len(), models).with_input_artifact(input_artifact);
        let job_id = record.id;
        self.store.insert_job(&record).await?;

        let signal = self.controls.register(job_id);
        let worker = JobWorker::new(
            record,
            items,
            self.store.clone(),
            self.translator.clone(),
            self.evaluator.clone(),
            self.throughput.clone(),
            signal,
            self.output_dir.clone(),
        );

        let store = self.store.clone();
        let controls = self.controls.clone();
        self.tracker.spawn(async move {
            if let Err(e) = tokio::spawn(worker.run()).await {
                tracing::error!(job_id = %job_id, error = %e, "Job worker panicked");
                mark_failed(store.as_ref(), job_id, format!("Worker panicked: {e}")).await;
            }
            controls.unregister(job_id);
        });

        tracing::info!(job_id = %job_id, "Job created");
        Ok(job_id)
    }

    pub async fn pause(&self, job_id: Uuid) -> Result<(), ControlError> {
        self.command(job_id, ControlCommand::Pause).await
    }

    pub async fn resume(&self, job_id: Uuid) -> Result<(), ControlError> {
        self.command(job_id, ControlCommand::Resume).await
    }

    pub async fn terminate(&self, job_id: Uuid) -> Result<(), ControlError> {
        self.command(job_id, ControlCommand::Terminate).await
    }

    async fn command(&self, job_id: Uuid, command: ControlCommand) -> Result<(), ControlError> {
        let job = self
            .store
            .get_job(job_id)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?
            .ok_or(ControlError::JobNotFound(job_id))?;

        let allowed = match command {
            ControlCommand::Pause => job.status == JobStatus::Running,
            ControlCommand::Resume => job.status == JobStatus::Paused,
            ControlCommand::Terminate => job.status.is_active(),
        };
        if !allowed {
            tracing::debug!(job_id = %job_id, %command, status = %job.status, "Control command rejected");
            return Err(ControlError::Rejected {
                command,
                status: job.status,
            });
        }

        self.controls.update(job_id, |flags| match command {
            ControlCommand::Pause => flags.paused = true,
            ControlCommand::Resume => flags.paused = false,
            ControlCommand::Terminate => flags.terminated = true,
        })?;
        tracing::info!(job_id = %job_id, %command, "Control command accepted");
        Ok(())
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<JobStatusView, EvalError> {
        let record = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(EvalError::JobNotFound(job_id))?;
        let results = self.store.list_results(job_id).await?;
        let model_statistics =
            (record.status == JobStatus::Completed).then(|| model_statistics(&results));

        Ok(JobStatusView {
            record,
            results_count: results.len(),
            model_statistics,
            unit_counters: self.unit_counters(job_id),
        })
    }

    /// Per-model unit tallies for a job, including units that failed and
    /// left no result behind.
    pub fn unit_counters(&self, job_id: Uuid) -> BTreeMap<String, UnitCounters> {
        self.logs
            .as_ref()
            .map(|logs| logs.unit_counters(job_id))
            .unwrap_or_default()
    }

    /// The job's most recent log entries, oldest first.
    pub fn job_logs(&self, job_id: Uuid, limit: usize) -> Vec<LogEntry> {
        self.logs
            .as_ref()
            .map(|logs| logs.job_entries(job_id, limit))
            .unwrap_or_default()
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>, EvalError> {
        self.store.list_jobs().await
    }

    pub async fn job_results(&self, job_id: Uuid) -> Result<Vec<UnitResult>, EvalError> {
        if self.store.get_job(job_id).await?.is_none() {
            return Err(EvalError::JobNotFound(job_id));
        }
        self.store.list_results(job_id).await
    }

    /// Whether the job still has a live worker.
    pub fn is_active(&self, job_id: Uuid) -> bool {
        self.controls.contains(job_id)
    }

    /// Wait until every job started so far has reached a terminal state and
    /// released its control entry.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Terminate every active job and wait for the workers to stop.
    pub async fn shutdown(&self) {
        for job_id in self.controls.ids() {
            match self.terminate(job_id).await {
                Ok(()) => {}
                // Not yet at its first checkpoint; flag it directly.
                Err(ControlError::Rejected {
                    status: JobStatus::Pending,
                    ..
                }) => {
                    if let Err(e) = self.controls.update(job_id, |f| f.terminated = true) {
                        tracing::debug!(job_id = %job_id, error = %e, "Pending job already gone");
                    }
                }
                Err(e) => tracing::debug!(job_id = %job_id, error = %e, "Skipped during shutdown"),
            }
        }
        self.wait_idle().await;
    }
}

async fn mark_failed(store: &dyn JobStore, job_id: Uuid, message: String) {
    let mut record = match store.get_job(job_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Could not load job to mark it failed");
            return;
        }
    };
    if record.status.is_terminal() {
        return;
    }
    if let Err(e) = record.fail(message) {
        tracing::error!(job_id = %job_id, error = %e, "Could not mark job failed");
        return;
    }
    if let Err(e) = store.update_job(&record).await {
        tracing::error!(job_id = %job_id, error = %e, "Could not persist failed job");
    }
}
