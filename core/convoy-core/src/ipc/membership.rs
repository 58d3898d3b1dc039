//! Alive-worker bookkeeping maintained by the master's control handlers.

use std::time::Instant;

use dashmap::DashMap;

use super::message::WorkerId;

/// Thread-safe map of currently connected workers. Shared read-only with
/// the layers above the core (e.g. the dataset-management API checks it
/// before scheduling an ingest).
#[derive(Default)]
pub struct WorkerRegistry {
    alive: DashMap<WorkerId, Instant>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, worker: WorkerId) {
        self.alive.insert(worker, Instant::now());
    }

    pub fn unregister(&self, worker: WorkerId) {
        self.alive.remove(&worker);
    }

    pub fn is_alive(&self, worker: WorkerId) -> bool {
        self.alive.contains_key(&worker)
    }

    /// Snapshot of alive workers, sorted for deterministic output.
    pub fn alive_workers(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.alive.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.alive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }
}
