// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of live workers
//!
//! Keyed by [`WorkerId`] in a `BTreeMap`, so iteration and snapshots are in
//! ascending id order and rolling restarts visit workers deterministically.

use crate::worker::{Worker, WorkerId};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Registry {
    workers: BTreeMap<WorkerId, Worker>,
    last_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next identifier. Identifiers are never reused.
    pub fn allocate_id(&mut self) -> WorkerId {
        self.last_id += 1;
        WorkerId(self.last_id)
    }

    pub fn insert(&mut self, worker: Worker) {
        self.workers.insert(worker.id, worker);
    }

    pub fn remove(&mut self, id: WorkerId) -> Option<Worker> {
        self.workers.remove(&id)
    }

    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    pub fn get_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(&id)
    }

    pub fn is_connected(&self, id: WorkerId) -> bool {
        self.get(id).is_some_and(Worker::is_connected)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Connected workers in ascending id order
    pub fn snapshot(&self) -> Vec<WorkerId> {
        self.iter()
            .filter(|w| w.is_connected())
            .map(|w| w.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.iter().filter(|w| w.is_ready()).count()
    }

    pub fn connected_count(&self) -> usize {
        self.iter().filter(|w| w.is_connected()).count()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
