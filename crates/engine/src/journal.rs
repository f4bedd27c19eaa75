// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded log of pool lifecycle transitions

use nodown_core::{ExitKind, WorkerId};
use std::collections::VecDeque;

/// Entries kept before the oldest are dropped
pub const JOURNAL_CAPACITY: usize = 1024;

/// One lifecycle transition observed by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEntry {
    Spawned(WorkerId),
    Ready(WorkerId),
    RetireRequested(WorkerId),
    Exited { id: WorkerId, kind: ExitKind },
    Respawned {
        crashed: WorkerId,
        replacement: WorkerId,
    },
}

#[derive(Debug)]
pub struct Journal {
    entries: VecDeque<PoolEntry>,
    capacity: usize,
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_capacity(JOURNAL_CAPACITY)
    }
}

impl Journal {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, entry: PoolEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
