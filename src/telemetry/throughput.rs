//! Per-model throughput counters fed by job workers.
//!
//! Local models are counted twice: in their own bucket and in one aggregate
//! bucket across all local models, which older dashboards still read. Remote
//! (API) models get their own buckets. Buckets keep first-seen order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::Serialize;

use crate::report::round2;

const MIN_TOKENS: u64 = 1;
const MIN_SECONDS: f64 = 0.1;

/// Name reported for the aggregate local bucket.
pub const LOCAL_AGGREGATE_NAME: &str = "Local Models (aggregated)";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCounters {
    pub total_requests: u64,
    pub total_tokens: u64,
    /// Seconds.
    pub total_time: f64,
    pub avg_tokens_per_sec: f64,
    pub last_speed: f64,
}

impl ModelCounters {
    fn record(&mut self, tokens: u64, seconds: f64) {
        self.total_requests += 1;
        self.total_tokens += tokens;
        self.total_time += seconds;
        if self.total_time > 0.0 {
            self.avg_tokens_per_sec = round2(self.total_tokens as f64 / self.total_time);
        }
        self.last_speed = round2(tokens as f64 / seconds);
    }

    fn entry(&self, name: &str) -> SpeedEntry {
        SpeedEntry {
            name: name.to_string(),
            avg_speed: self.avg_tokens_per_sec,
            last_speed: self.last_speed,
            total_requests: self.total_requests,
            total_tokens: self.total_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThroughputStats {
    pub local_model: ModelCounters,
    pub local_models: IndexMap<String, ModelCounters>,
    pub api_models: IndexMap<String, ModelCounters>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedEntry {
    pub name: String,
    pub avg_speed: f64,
    pub last_speed: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
}

/// Side-by-side speeds, in registration order. No ranking is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedComparison {
    pub local_model: SpeedEntry,
    pub local_models: Vec<SpeedEntry>,
    pub api_models: Vec<SpeedEntry>,
}

/// Thread-safe accumulator. Every update and every read takes the one lock,
/// so readers never see a half-applied record.
#[derive(Debug, Default)]
pub struct ThroughputRecorder {
    stats: Mutex<ThroughputStats>,
}

impl ThroughputRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stats(&self) -> MutexGuard<'_, ThroughputStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one unit of work. Zero tokens count as 1 and non-positive or NaN
    /// durations as 0.1s, so speeds are always defined.
    pub fn record(&self, model: &str, tokens_generated: u64, time_taken_secs: f64, is_local: bool) {
        let tokens = tokens_generated.max(MIN_TOKENS);
        let seconds = if time_taken_secs.is_nan() || time_taken_secs <= 0.0 {
            MIN_SECONDS
        } else {
            time_taken_secs
        };

        let mut stats = self.stats();
        let bucket = if is_local {
            stats.local_model.record(tokens, seconds);
            stats.local_models.entry(model.to_string()).or_default()
        } else {
            stats.api_models.entry(model.to_string()).or_default()
        };
        bucket.record(tokens, seconds);
        let last_speed = bucket.last_speed;
        drop(stats);

        tracing::debug!(
            model,
            tokens,
            seconds,
            last_speed,
            is_local,
            "Recorded translation throughput"
        );
    }

    pub fn snapshot(&self) -> ThroughputStats {
        self.stats().clone()
    }

    pub fn comparison(&self) -> SpeedComparison {
        let stats = self.stats();
        SpeedComparison {
            local_model: stats.local_model.entry(LOCAL_AGGREGATE_NAME),
            local_models: stats
                .local_models
                .iter()
                .map(|(name, c)| c.entry(name))
                .collect(),
            api_models: stats
                .api_models
                .iter()
                .map(|(name, c)| c.entry(name))
                .collect(),
        }
    }
}
