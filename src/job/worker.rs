use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::control::{ControlFlags, ControlSignal};
use super::record::{JobRecord, UnitResult, progress_percent};
use super::state::JobStatus;
use crate::backend::{Evaluator, Translator};
use crate::data::TranslationPair;
use crate::error::EvalError;
use crate::report::{build_report, write_report};
use crate::store::JobStore;
use crate::telemetry::ThroughputRecorder;

/// How a job run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Terminated,
}

/// Runs one job from `pending` to a terminal state.
///
/// Control flags are checked before each work item. Inside an item every
/// selected model is a separate unit: a failed unit is logged and skipped.
/// Unit events carry a `unit` field (`started`, `completed`, `failed`) that
/// the log buffer counts per model.
/// Anything that breaks persistence or the final report fails the whole job.
pub struct JobWorker {
    record: JobRecord,
    items: Vec<TranslationPair>,
    store: Arc<dyn JobStore>,
    translator: Arc<dyn Translator>,
    evaluator: Arc<dyn Evaluator>,
    throughput: Arc<ThroughputRecorder>,
    signal: ControlSignal,
    output_dir: PathBuf,
}

impl JobWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        record: JobRecord,
        items: Vec<TranslationPair>,
        store: Arc<dyn JobStore>,
        translator: Arc<dyn Translator>,
        evaluator: Arc<dyn Evaluator>,
        throughput: Arc<ThroughputRecorder>,
        signal: ControlSignal,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            record,
            items,
            store,
            translator,
            evaluator,
            throughput,
            signal,
            output_dir,
        }
    }

    /// Run to completion and return the final record.
    pub async fn run(mut self) -> JobRecord {
        let job_id = self.record.id;
        match self.execute().await {
            Ok(outcome) => {
                tracing::info!(job_id = %job_id, ?outcome, progress = self.record.progress, "Job finished");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                if !self.record.status.is_terminal() {
                    if let Err(te) = self.record.fail(e.to_string()) {
                        tracing::error!(job_id = %job_id, error = %te, "Could not mark job failed");
                    }
                }
                if let Err(pe) = self.persist().await {
                    tracing::error!(job_id = %job_id, error = %pe, "Could not persist failed job");
                }
            }
        }
        self.record
    }

    async fn execute(&mut self) -> Result<Outcome, EvalError> {
        let job_id = self.record.id;
        self.record.transition(JobStatus::Running)?;
        self.persist().await?;
        tracing::info!(
            job_id = %job_id,
            items = self.items.len(),
            models = self.record.models.len(),
            "Job started"
        );

        let items = std::mem::take(&mut self.items);
        let models = self.record.models.clone();
        let total = items.len();

        for (index, pair) in items.iter().enumerate() {
            if let Some(outcome) = self.checkpoint().await? {
                return Ok(outcome);
            }

            self.record.advance_progress(progress_percent(index, total));
            self.persist().await?;

            for model in &models {
                tracing::debug!(job_id = %job_id, pair_id = %pair.id, model = %model, unit = "started", "Work unit started");
                match self.process_unit(pair, model).await {
                    Ok(()) => {
                        tracing::debug!(job_id = %job_id, pair_id = %pair.id, model = %model, unit = "completed", "Work unit completed");
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job_id,
                            pair_id = %pair.id,
                            model = %model,
                            unit = "failed",
                            error = %e,
                            "Work unit failed, skipping"
                        );
                    }
                }
            }
        }

        let results = self.store.list_results(job_id).await?;
        let report = build_report(&results, &models, Utc::now());
        let path = write_report(&self.output_dir, job_id, &report).await?;
        tracing::info!(job_id = %job_id, path = %path.display(), results = results.len(), "Report written");

        self.record.complete(path.display().to_string())?;
        self.persist().await?;
        Ok(Outcome::Completed)
    }

    /// Honour pause/terminate before the next item. Returns `Some` when the
    /// job must stop here.
    async fn checkpoint(&mut self) -> Result<Option<Outcome>, EvalError> {
        let job_id = self.record.id;
        let mut flags = self.signal.flags();
        let mut was_paused = false;

        if flags.paused && !flags.terminated {
            self.record.transition(JobStatus::Paused)?;
            self.persist().await?;
            tracing::info!(job_id = %job_id, progress = self.record.progress, "Job paused");
            was_paused = true;
            flags = self.wait_while_paused().await;
        }

        if flags.terminated {
            let reason = if was_paused {
                "Terminated while paused"
            } else {
                "Terminated by user"
            };
            self.record.terminate(reason.to_string())?;
            self.persist().await?;
            return Ok(Some(Outcome::Terminated));
        }

        if was_paused {
            self.record.transition(JobStatus::Running)?;
            self.persist().await?;
            tracing::info!(job_id = %job_id, "Job resumed");
        }
        Ok(None)
    }

    async fn wait_while_paused(&mut self) -> ControlFlags {
        loop {
            if !self.signal.changed().await {
                // Entry dropped from under a paused job; nobody can resume it.
                return ControlFlags {
                    paused: true,
                    terminated: true,
                };
            }
            let flags = self.signal.flags();
            if flags.terminated || !flags.paused {
                return flags;
            }
        }
    }

    /// Throughput counts every successful translation, even when scoring
    /// that translation then fails.
    async fn process_unit(&self, pair: &TranslationPair, model: &str) -> Result<(), EvalError> {
        let started = Instant::now();
        let translation = self.translator.translate(model, pair).await?;
        self.throughput.record(
            model,
            translation.tokens_generated,
            started.elapsed().as_secs_f64(),
            translation.is_local,
        );

        let evaluation = self.evaluator.evaluate(pair, &translation).await?;
        let result = UnitResult::new(
            self.record.id,
            pair,
            model,
            translation.text,
            evaluation.scores,
            evaluation.details,
        );
        self.store.insert_result(&result).await
    }

    async fn persist(&self) -> Result<(), EvalError> {
        self.store.update_job(&self.record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, EchoTranslator, Evaluation, ExactMatchEvaluator, Translation};
    use crate::job::ControlRegistry;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    /// Memory store that remembers every progress value it was given.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        progress: Mutex<Vec<u8>>,
        statuses: Mutex<Vec<JobStatus>>,
    }

    #[async_trait]
    impl JobStore for RecordingStore {
        async fn insert_job(&self, job: &JobRecord) -> Result<(), EvalError> {
            self.inner.insert_job(job).await
        }
        async fn update_job(&self, job: &JobRecord) -> Result<(), EvalError> {
            self.progress.lock().unwrap().push(job.progress);
            self.statuses.lock().unwrap().push(job.status);
            self.inner.update_job(job).await
        }
        async fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>, EvalError> {
            self.inner.get_job(id).await
        }
        async fn list_jobs(&self) -> Result<Vec<JobRecord>, EvalError> {
            self.inner.list_jobs().await
        }
        async fn insert_result(&self, result: &UnitResult) -> Result<(), EvalError> {
            self.inner.insert_result(result).await
        }
        async fn list_results(&self, job_id: Uuid) -> Result<Vec<UnitResult>, EvalError> {
            self.inner.list_results(job_id).await
        }
    }

    /// Refuses to score pair "p1", whatever the model.
    struct PickyEvaluator;

    #[async_trait]
    impl Evaluator for PickyEvaluator {
        async fn evaluate(
            &self,
            pair: &TranslationPair,
            translation: &Translation,
        ) -> Result<Evaluation, BackendError> {
            if pair.id == "p1" {
                return Err(BackendError::ParseError("no JSON object in reply".into()));
            }
            ExactMatchEvaluator.evaluate(pair, translation).await
        }
    }

    fn pairs(n: usize) -> Vec<TranslationPair> {
        (0..n)
            .map(|i| TranslationPair::new(format!("p{i}"), format!("source {i}"), format!("目标 {i}")))
            .collect()
    }

    struct Fixture {
        store: Arc<RecordingStore>,
        registry: ControlRegistry,
        throughput: Arc<ThroughputRecorder>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(RecordingStore::default()),
                registry: ControlRegistry::new(),
                throughput: Arc::new(ThroughputRecorder::new()),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        async fn worker(&self, n: usize, models: &[&str]) -> (Uuid, JobWorker) {
            self.worker_with(n, models, Arc::new(ExactMatchEvaluator)).await
        }

        async fn worker_with(
            &self,
            n: usize,
            models: &[&str],
            evaluator: Arc<dyn Evaluator>,
        ) -> (Uuid, JobWorker) {
            let record = JobRecord::new(
                "test".into(),
                n,
                models.iter().map(|m| m.to_string()).collect(),
            );
            let id = record.id;
            self.store.insert_job(&record).await.unwrap();
            let signal = self.registry.register(id);
            let worker = JobWorker::new(
                record,
                pairs(n),
                self.store.clone(),
                Arc::new(EchoTranslator),
                evaluator,
                self.throughput.clone(),
                signal,
                self.dir.path().to_path_buf(),
            );
            (id, worker)
        }
    }

    #[tokio::test]
    async fn completes_every_unit_and_writes_report() {
        let fx = Fixture::new();
        let (id, worker) = fx.worker(4, &["a", "b"]).await;
        let record = worker.run().await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.completed_at.is_some());
        assert_eq!(fx.store.list_results(id).await.unwrap().len(), 8);

        let path = PathBuf::from(record.output_artifact.unwrap());
        assert!(path.starts_with(fx.dir.path()));
        let report: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(report["summary"]["total_pairs"], 4);
        assert_eq!(report["model_performance"]["a"]["avg_overall"], 10.0);

        assert_eq!(fx.throughput.snapshot().local_model.total_requests, 8);
    }

    #[tokio::test]
    async fn failed_evaluation_skips_the_unit() {
        let fx = Fixture::new();
        let (id, worker) = fx.worker_with(3, &["a", "b"], Arc::new(PickyEvaluator)).await;
        let record = worker.run().await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        let results = fx.store.list_results(id).await.unwrap();
        // 3 items x 2 models, minus both units of p1
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.pair_id != "p1"));

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(record.output_artifact.unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(report["summary"]["total_pairs"], 2);
        assert_eq!(report["model_performance"]["b"]["total_translations"], 2);

        // Translation itself succeeded for p1, so its speed is still recorded.
        let stats = fx.throughput.snapshot();
        assert_eq!(stats.local_model.total_requests, 6);
        assert_eq!(stats.local_models["a"].total_requests, 3);
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let fx = Fixture::new();
        let (_, worker) = fx.worker(7, &["a"]).await;
        worker.run().await;

        let progress = fx.store.progress.lock().unwrap().clone();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
        assert_eq!(progress.last(), Some(&100));
        // 0, 14, 28, 42, 57, 71, 85 before each item
        assert!(progress.contains(&85));
    }

    #[tokio::test]
    async fn empty_job_completes_with_empty_report() {
        let fx = Fixture::new();
        let (id, worker) = fx.worker(0, &["a"]).await;
        let record = worker.run().await;
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(fx.store.list_results(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn terminate_before_first_item() {
        let fx = Fixture::new();
        let (id, worker) = fx.worker(5, &["a"]).await;
        fx.registry.update(id, |f| f.terminated = true).unwrap();

        let record = worker.run().await;
        assert_eq!(record.status, JobStatus::Terminated);
        assert_eq!(record.error_message.as_deref(), Some("Terminated by user"));
        assert!(record.output_artifact.is_none());
        assert!(fx.store.list_results(id).await.unwrap().is_empty());
        assert_eq!(
            fx.store.get_job(id).await.unwrap().unwrap().status,
            JobStatus::Terminated
        );
    }

    #[tokio::test]
    async fn pause_then_resume_yields_full_results() {
        let fx = Fixture::new();
        let (id, worker) = fx.worker(3, &["a", "b"]).await;
        fx.registry.update(id, |f| f.paused = true).unwrap();

        let handle = tokio::spawn(worker.run());
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let job = fx.store.get_job(id).await.unwrap().unwrap();
                if job.status == JobStatus::Paused {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(fx.store.list_results(id).await.unwrap().is_empty());

        fx.registry.update(id, |f| f.paused = false).unwrap();
        let record = handle.await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(fx.store.list_results(id).await.unwrap().len(), 6);

        let statuses = fx.store.statuses.lock().unwrap().clone();
        let paused_at = statuses.iter().position(|s| *s == JobStatus::Paused).unwrap();
        assert_eq!(statuses[paused_at + 1], JobStatus::Running);
    }

    #[tokio::test]
    async fn terminate_while_paused() {
        let fx = Fixture::new();
        let (id, worker) = fx.worker(3, &["a"]).await;
        fx.registry.update(id, |f| f.paused = true).unwrap();

        let handle = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.registry.update(id, |f| f.terminated = true).unwrap();

        let record = handle.await.unwrap();
        assert_eq!(record.status, JobStatus::Terminated);
        assert_eq!(record.error_message.as_deref(), Some("Terminated while paused"));
    }

    #[tokio::test]
    async fn unreadable_output_dir_fails_the_job() {
        let fx = Fixture::new();
        let blocker = fx.dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let (id, mut worker) = fx.worker(2, &["a"]).await;
        worker.output_dir = blocker;
        let record = worker.run().await;

        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error_message.is_some());
        assert!(record.output_artifact.is_none());
        // units ran before the report step
        assert_eq!(fx.store.list_results(id).await.unwrap().len(), 2);
        assert_eq!(
            fx.store.get_job(id).await.unwrap().unwrap().status,
            JobStatus::Failed
        );
    }
}
