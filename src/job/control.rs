//! Per-job pause/terminate flags shared between command callers and workers.
//!
//! Each active job owns one `watch` channel. Commands flip flags through
//! [`ControlRegistry::update`], which is an atomic read-modify-write on the
//! channel value. The worker side holds a [`ControlSignal`] and can await a
//! change instead of sleeping through a poll interval.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::ControlError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub paused: bool,
    pub terminated: bool,
}

/// Registry of control entries for jobs that have a live worker.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    entries: Mutex<HashMap<Uuid, watch::Sender<ControlFlags>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, watch::Sender<ControlFlags>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a fresh, cleared entry for `job_id` and hand back the worker side.
    /// Registering an id twice replaces the old entry.
    pub fn register(&self, job_id: Uuid) -> ControlSignal {
        let (tx, rx) = watch::channel(ControlFlags::default());
        self.entries().insert(job_id, tx);
        ControlSignal { rx }
    }

    /// Drop the entry for `job_id`. Returns whether one existed.
    pub fn unregister(&self, job_id: Uuid) -> bool {
        self.entries().remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: Uuid) -> Option<ControlFlags> {
        self.entries().get(&job_id).map(|tx| *tx.borrow())
    }

    pub fn contains(&self, job_id: Uuid) -> bool {
        self.entries().contains_key(&job_id)
    }

    /// Ids of all jobs that currently have an entry.
    pub fn ids(&self) -> Vec<Uuid> {
        self.entries().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Apply `f` to the job's flags and wake its worker.
    pub fn update(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut ControlFlags),
    ) -> Result<ControlFlags, ControlError> {
        let entries = self.entries();
        let tx = entries
            .get(&job_id)
            .ok_or(ControlError::NotActive(job_id))?;
        tx.send_modify(f);
        let flags = *tx.borrow();
        Ok(flags)
    }
}

/// Worker-side view of a job's control entry. Read-only.
#[derive(Debug, Clone)]
pub struct ControlSignal {
    rx: watch::Receiver<ControlFlags>,
}

impl ControlSignal {
    /// Current flags, marking them as seen.
    pub fn flags(&mut self) -> ControlFlags {
        *self.rx.borrow_and_update()
    }

    /// Wait until the flags change. Returns `false` once the entry has been
    /// dropped from the registry, after which no further change can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn register_starts_cleared() {
        let registry = ControlRegistry::new();
        let id = Uuid::new_v4();
        let mut signal = registry.register(id);
        assert_eq!(signal.flags(), ControlFlags::default());
        assert_eq!(registry.get(id), Some(ControlFlags::default()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_is_visible_to_worker() {
        let registry = ControlRegistry::new();
        let id = Uuid::new_v4();
        let mut signal = registry.register(id);
        registry.update(id, |f| f.paused = true).unwrap();
        assert!(signal.flags().paused);
        assert!(!signal.flags().terminated);
    }

    #[test]
    fn update_unknown_job_is_not_active() {
        let registry = ControlRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.update(id, |f| f.terminated = true),
            Err(ControlError::NotActive(id))
        );
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = ControlRegistry::new();
        let id = Uuid::new_v4();
        let _signal = registry.register(id);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
        assert!(registry.get(id).is_none());
    }

    #[tokio::test]
    async fn changed_wakes_on_update() {
        let registry = Arc::new(ControlRegistry::new());
        let id = Uuid::new_v4();
        let mut signal = registry.register(id);
        signal.flags();

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.update(id, |f| f.terminated = true).unwrap();
        });

        let woke = tokio::time::timeout(Duration::from_secs(2), signal.changed())
            .await
            .expect("worker should be woken");
        assert!(woke);
        assert!(signal.flags().terminated);
    }

    #[tokio::test]
    async fn changed_reports_dropped_entry() {
        let registry = ControlRegistry::new();
        let id = Uuid::new_v4();
        let mut signal = registry.register(id);
        registry.unregister(id);
        assert!(!signal.changed().await);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let registry = Arc::new(ControlRegistry::new());
        let id = Uuid::new_v4();
        let _signal = registry.register(id);

        let pauser = {
            let r = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    r.update(id, |f| f.paused = true).unwrap();
                }
            })
        };
        let terminator = {
            let r = registry.clone();
            std::thread::spawn(move || {
                r.update(id, |f| f.terminated = true).unwrap();
            })
        };
        pauser.join().unwrap();
        terminator.join().unwrap();

        let flags = registry.get(id).unwrap();
        assert!(flags.paused);
        assert!(flags.terminated);
    }
}
