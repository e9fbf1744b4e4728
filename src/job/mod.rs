//! Batch translation-evaluation jobs: persisted state, control channel,
//! worker loop and the manager that ties them together.

pub mod control;
pub mod manager;
pub mod record;
pub mod state;
pub mod worker;

pub use control::{ControlFlags, ControlRegistry, ControlSignal};
pub use manager::{JobManager, JobStatusView};
pub use record::{JobRecord, Scores, UnitResult, progress_percent};
pub use state::JobStatus;
pub use worker::{JobWorker, Outcome};
