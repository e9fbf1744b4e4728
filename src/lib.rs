//! Batch translation-evaluation jobs that can be paused, resumed and
//! terminated while they run, plus a telemetry sampler that watches the
//! local machine and the model endpoints doing the work.

pub mod backend;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod job;
pub mod report;
pub mod store;
pub mod telemetry;
pub mod ui;
