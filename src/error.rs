use thiserror::Error;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("A job needs at least one work item")]
    EmptyWorkItems,

    #[error("A job needs at least one selected model")]
    NoModelsSelected,

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a pause/resume/terminate command is turned away.
///
/// A rejected command never touches the job's control entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Cannot {command} a job that is {status}")]
    Rejected {
        command: ControlCommand,
        status: JobStatus,
    },

    #[error("Job {0} has no active worker")]
    NotActive(Uuid),

    #[error("Store error: {0}")]
    Store(String),
}

/// External commands accepted by a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Pause,
    Resume,
    Terminate,
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::Pause => write!(f, "pause"),
            ControlCommand::Resume => write!(f, "resume"),
            ControlCommand::Terminate => write!(f, "terminate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("resource statistics unavailable: {0}")]
    Unavailable(String),

    #[error("could not build probe client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_names_command_and_status() {
        let err = ControlError::Rejected {
            command: ControlCommand::Pause,
            status: JobStatus::Pending,
        };
        assert_eq!(err.to_string(), "Cannot pause a job that is pending");
    }

    #[test]
    fn invalid_transition_display() {
        let err = EvalError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition completed -> running"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EvalError>();
        assert_send_sync::<ControlError>();
    }
}
