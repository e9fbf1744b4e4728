//! In-memory log buffer fed by a `tracing` layer.
//!
//! [`LogLayer`] copies every event it sees into a bounded [`LogBuffer`], so
//! recent activity and per-unit failures can be queried after the fact. Events
//! that carry a `unit` field (`started`, `completed` or `failed`) together with
//! `job_id` and `model` also move the per-job, per-model [`UnitCounters`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use uuid::Uuid;

/// Entries kept when no capacity is configured.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// One captured event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Remaining structured fields, rendered as text.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn is_problem(&self) -> bool {
        self.level == Level::WARN.as_str() || self.level == Level::ERROR.as_str()
    }
}

/// Work-unit tallies for one model within one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitCounters {
    pub total: u64,
    pub completed: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Inner {
    entries: VecDeque<LogEntry>,
    units: HashMap<Uuid, BTreeMap<String, UnitCounters>>,
}

pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    /// Buffer holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Layer that feeds this buffer.
    pub fn layer(self: &Arc<Self>) -> LogLayer {
        LogLayer {
            buffer: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: LogEntry) {
        let mut inner = self.lock();
        while inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.lock().entries.iter().rev().take(limit).cloned().collect()
    }

    /// Warnings and errors, newest first.
    pub fn problems(&self, limit: usize) -> Vec<LogEntry> {
        self.lock()
            .entries
            .iter()
            .rev()
            .filter(|e| e.is_problem())
            .take(limit)
            .cloned()
            .collect()
    }

    /// The last `limit` entries of one job, oldest first.
    pub fn job_entries(&self, job_id: Uuid, limit: usize) -> Vec<LogEntry> {
        let inner = self.lock();
        let mut entries: Vec<LogEntry> = inner
            .entries
            .iter()
            .rev()
            .filter(|e| e.job_id == Some(job_id))
            .take(limit)
            .cloned()
            .collect();
        entries.reverse();
        entries
    }

    pub fn unit_counters(&self, job_id: Uuid) -> BTreeMap<String, UnitCounters> {
        self.lock().units.get(&job_id).cloned().unwrap_or_default()
    }

    /// Drop the counters of a job. Its entries age out with the ring.
    pub fn clear_job(&self, job_id: Uuid) {
        self.lock().units.remove(&job_id);
    }

    fn count_unit(&self, job_id: Uuid, model: &str, outcome: &str) {
        let mut inner = self.lock();
        let counters = inner
            .units
            .entry(job_id)
            .or_default()
            .entry(model.to_string())
            .or_default();
        match outcome {
            "started" => counters.total += 1,
            "completed" => counters.completed += 1,
            "failed" => counters.errors += 1,
            _ => {}
        }
    }
}

/// `tracing` layer writing into a [`LogBuffer`].
///
/// Every event updates the unit counters; only `info` and above are kept as
/// entries.
pub struct LogLayer {
    buffer: Arc<LogBuffer>,
}

#[derive(Default)]
struct EventFields {
    message: String,
    job_id: Option<Uuid>,
    model: Option<String>,
    unit: Option<String>,
    rest: BTreeMap<String, String>,
}

impl EventFields {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "job_id" => self.job_id = Uuid::parse_str(&value).ok(),
            "model" => self.model = Some(value),
            "unit" => self.unit = Some(value),
            name => {
                self.rest.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for LogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut fields = EventFields::default();
        event.record(&mut fields);

        if let (Some(job_id), Some(model), Some(unit)) = (fields.job_id, &fields.model, &fields.unit)
        {
            self.buffer.count_unit(job_id, model, unit);
        }

        if *meta.level() > Level::INFO {
            return;
        }
        if let Some(unit) = fields.unit {
            fields.rest.insert("unit".to_string(), unit);
        }
        self.buffer.push(LogEntry {
            timestamp: Utc::now(),
            level: meta.level().as_str().to_string(),
            target: meta.target().to_string(),
            message: fields.message,
            job_id: fields.job_id,
            model: fields.model,
            fields: fields.rest,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    fn capture(capacity: usize) -> (Arc<LogBuffer>, tracing::subscriber::DefaultGuard) {
        let buffer = Arc::new(LogBuffer::new(capacity));
        let subscriber = tracing_subscriber::registry().with(buffer.layer());
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    #[test]
    fn captures_message_and_fields() {
        let (buffer, _guard) = capture(10);
        let job_id = Uuid::new_v4();
        tracing::info!(job_id = %job_id, model = "gemma", pair_id = "p1", "Report written");

        let entries = buffer.recent(10);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.message, "Report written");
        assert_eq!(entry.job_id, Some(job_id));
        assert_eq!(entry.model.as_deref(), Some("gemma"));
        assert_eq!(entry.fields["pair_id"], "p1");
    }

    #[test]
    fn ring_drops_oldest_entries() {
        let (buffer, _guard) = capture(3);
        for i in 0..5 {
            tracing::info!(i, "event");
        }
        assert_eq!(buffer.len(), 3);
        let recent: Vec<_> = buffer.recent(10).into_iter().map(|e| e.fields["i"].clone()).collect();
        assert_eq!(recent, vec!["4", "3", "2"]);
    }

    #[test]
    fn debug_events_count_units_but_are_not_kept() {
        let (buffer, _guard) = capture(10);
        let job_id = Uuid::new_v4();
        for _ in 0..2 {
            tracing::debug!(job_id = %job_id, model = "a", unit = "started", "Work unit started");
        }
        tracing::debug!(job_id = %job_id, model = "a", unit = "completed", "Work unit completed");
        tracing::warn!(job_id = %job_id, model = "a", unit = "failed", error = "boom", "Work unit failed");

        assert_eq!(
            buffer.unit_counters(job_id)["a"],
            UnitCounters {
                total: 2,
                completed: 1,
                errors: 1
            }
        );
        let problems = buffer.problems(10);
        assert_eq!(problems.len(), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(problems[0].fields["error"], "boom");
        assert_eq!(problems[0].fields["unit"], "failed");
    }

    #[test]
    fn job_entries_are_oldest_first_and_limited() {
        let (buffer, _guard) = capture(20);
        let job = Uuid::new_v4();
        let other = Uuid::new_v4();
        for i in 0..4 {
            tracing::info!(job_id = %job, step = i, "step");
            tracing::info!(job_id = %other, step = i, "other");
        }
        let steps: Vec<_> = buffer
            .job_entries(job, 3)
            .into_iter()
            .map(|e| e.fields["step"].clone())
            .collect();
        assert_eq!(steps, vec!["1", "2", "3"]);
    }

    #[test]
    fn clear_job_forgets_counters() {
        let (buffer, _guard) = capture(10);
        let job_id = Uuid::new_v4();
        tracing::info!(job_id = %job_id, model = "a", unit = "started", "Work unit started");
        assert_eq!(buffer.unit_counters(job_id)["a"].total, 1);
        buffer.clear_job(job_id);
        assert!(buffer.unit_counters(job_id).is_empty());
        assert!(buffer.unit_counters(Uuid::new_v4()).is_empty());
    }
}
