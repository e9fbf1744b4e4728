use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobStatus;
use crate::data::TranslationPair;
use crate::error::EvalError;

/// Persisted lifecycle state for one batch job.
///
/// While a worker is running it owns the record; everyone else reads snapshots
/// from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    /// Percentage of items started, 0..=100.
    pub progress: u8,
    pub total_items: usize,
    pub models: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Where the work items were loaded from, if anywhere.
    pub input_artifact: Option<String>,
    /// Where the finished report was written.
    pub output_artifact: Option<String>,
}

impl JobRecord {
    pub fn new(name: String, total_items: usize, models: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            status: JobStatus::Pending,
            progress: 0,
            total_items,
            models,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            input_artifact: None,
            output_artifact: None,
        }
    }

    pub fn with_input_artifact(mut self, input: Option<String>) -> Self {
        self.input_artifact = input;
        self
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    ///
    /// Entering a terminal state stamps `completed_at`.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), EvalError> {
        if !self.status.can_transition_to(next) {
            return Err(EvalError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Raise progress to `percent`. Progress never moves backwards and is capped at 100.
    pub fn advance_progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            self.updated_at = Utc::now();
        }
    }

    pub fn complete(&mut self, output_artifact: String) -> Result<(), EvalError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.output_artifact = Some(output_artifact);
        Ok(())
    }

    pub fn fail(&mut self, message: String) -> Result<(), EvalError> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message);
        Ok(())
    }

    pub fn terminate(&mut self, reason: String) -> Result<(), EvalError> {
        self.transition(JobStatus::Terminated)?;
        self.error_message = Some(reason);
        Ok(())
    }
}

/// `floor(index / total * 100)`; an empty job counts as done.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((index.min(total) * 100) / total) as u8
}

/// Scores produced by the evaluator for one translation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub accuracy: Option<f64>,
    pub fluency: Option<f64>,
    pub terminology: Option<f64>,
    pub overall: Option<f64>,
}

/// Outcome of one (work item, model) unit of work. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub job_id: Uuid,
    pub pair_id: String,
    pub source_text: String,
    pub target_text: String,
    pub model_name: String,
    pub translated_text: String,
    pub scores: Scores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl UnitResult {
    pub fn new(
        job_id: Uuid,
        pair: &TranslationPair,
        model_name: &str,
        translated_text: String,
        scores: Scores,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            job_id,
            pair_id: pair.id.clone(),
            source_text: pair.source_text.clone(),
            target_text: pair.target_text.clone(),
            model_name: model_name.to_string(),
            translated_text,
            scores,
            details,
            created_at: Utc::now(),
        }
    }
}
