use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::system::ResourceSample;

/// Rolling resource history with a fixed capacity. The oldest point is
/// evicted first.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    capacity: usize,
    timestamps: VecDeque<DateTime<Utc>>,
    cpu: VecDeque<f64>,
    memory: VecDeque<f64>,
    gpu_memory: VecDeque<f64>,
}

/// Point-in-time copy of the history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySnapshot {
    pub timestamps: Vec<DateTime<Utc>>,
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub gpu_memory: Vec<f64>,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            timestamps: VecDeque::with_capacity(capacity),
            cpu: VecDeque::with_capacity(capacity),
            memory: VecDeque::with_capacity(capacity),
            gpu_memory: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, at: DateTime<Utc>, sample: &ResourceSample) {
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
            self.cpu.pop_front();
            self.memory.pop_front();
            self.gpu_memory.pop_front();
        }
        self.timestamps.push_back(at);
        self.cpu.push_back(sample.cpu_percent);
        self.memory.push_back(sample.memory_percent);
        self.gpu_memory.push_back(sample.gpu_memory_percent);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            timestamps: self.timestamps.iter().copied().collect(),
            cpu: self.cpu.iter().copied().collect(),
            memory: self.memory.iter().copied().collect(),
            gpu_memory: self.gpu_memory.iter().copied().collect(),
        }
    }
}
