use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an evaluation job.
///
/// Jobs flow `Pending → Running → {Completed | Failed | Terminated}`, with
/// `Running ⇄ Paused` as the only reversible step. The three terminal states
/// are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Terminated,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Paused => write!(f, "paused"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Terminated => write!(f, "terminated"),
        }
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Terminated
        )
    }

    /// Whether the job currently has a live worker behind it.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Paused)
    }

    /// Whether moving from `self` to `next` is a legal edge of the state machine.
    ///
    /// - `Pending` may start, fail before starting, or be terminated.
    /// - `Running` may pause or reach any terminal state.
    /// - `Paused` may resume, be terminated, or fail.
    /// - Terminal states accept nothing.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Pending => matches!(next, Running | Failed | Terminated),
            Running => matches!(next, Paused | Completed | Failed | Terminated),
            Paused => matches!(next, Running | Failed | Terminated),
            Completed | Failed | Terminated => false,
        }
    }
}
