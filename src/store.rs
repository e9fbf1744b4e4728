//! Persistence seam for job records and unit results.
//!
//! Production deployments put a relational store behind [`JobStore`];
//! [`MemoryStore`] keeps everything in process and is what the CLI and the
//! tests use.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EvalError;
use crate::job::{JobRecord, UnitResult};

/// Simple CRUD over job records and their unit results.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &JobRecord) -> Result<(), EvalError>;

    /// Overwrite the stored record with the same id.
    async fn update_job(&self, job: &JobRecord) -> Result<(), EvalError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>, EvalError>;

    /// All jobs, newest first.
    async fn list_jobs(&self) -> Result<Vec<JobRecord>, EvalError>;

    async fn insert_result(&self, result: &UnitResult) -> Result<(), EvalError>;

    /// Results of one job in insertion order.
    async fn list_results(&self, job_id: Uuid) -> Result<Vec<UnitResult>, EvalError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    results: RwLock<HashMap<Uuid, Vec<UnitResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &JobRecord) -> Result<(), EvalError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(EvalError::Store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &JobRecord) -> Result<(), EvalError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(EvalError::JobNotFound(job.id)),
        }
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>, EvalError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<JobRecord>, EvalError> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn insert_result(&self, result: &UnitResult) -> Result<(), EvalError> {
        if !self.jobs.read().await.contains_key(&result.job_id) {
            return Err(EvalError::JobNotFound(result.job_id));
        }
        self.results
            .write()
            .await
            .entry(result.job_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn list_results(&self, job_id: Uuid) -> Result<Vec<UnitResult>, EvalError> {
        Ok(self
            .results
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }
}
