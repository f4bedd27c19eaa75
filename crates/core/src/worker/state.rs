// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a managed worker process.
///
/// Allocated monotonically by the [`Registry`](crate::Registry); a value is
/// never handed out twice, even when the spawn it was allocated for failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Process started, readiness not reported yet
    Starting,
    /// Worker reported readiness and is serving
    Ready,
    /// Supervisor asked the worker to stop accepting work and exit
    Retiring,
}

/// How a worker exit is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    /// The supervisor requested the retirement before the exit arrived
    Orchestrated,
    /// Anything else: crash, external kill, voluntary exit
    Unexpected,
}

/// A managed worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub status: WorkerStatus,
    /// Address reported alongside readiness, if any
    pub address: Option<String>,
    /// Set once the worker exits after a supervisor-issued retirement
    pub exited_after_retire: bool,
    /// Replacement being started for this worker by a restart step
    pub superseded_by: Option<WorkerId>,
}

impl Worker {
    /// Create a freshly spawned worker
    pub fn new(id: WorkerId, pid: Option<u32>) -> Self {
        Self {
            id,
            pid,
            status: WorkerStatus::Starting,
            address: None,
            exited_after_retire: false,
            superseded_by: None,
        }
    }

    /// Record readiness.
    ///
    /// Returns `false` when the worker is not starting anymore; readiness is
    /// only ever accepted once.
    pub fn mark_ready(&mut self, address: Option<String>) -> bool {
        if self.status != WorkerStatus::Starting {
            return false;
        }
        self.status = WorkerStatus::Ready;
        self.address = address;
        true
    }

    /// Record a supervisor-issued retirement.
    ///
    /// Returns `false` if the worker was already retiring.
    pub fn begin_retire(&mut self) -> bool {
        if self.status == WorkerStatus::Retiring {
            return false;
        }
        self.status = WorkerStatus::Retiring;
        true
    }

    /// Classify the exit of this worker.
    ///
    /// A termination signal alone never makes an exit orchestrated; only a
    /// retirement recorded before the exit does.
    pub fn mark_exited(&mut self) -> ExitKind {
        if self.status == WorkerStatus::Retiring {
            self.exited_after_retire = true;
            ExitKind::Orchestrated
        } else {
            ExitKind::Unexpected
        }
    }

    /// Starting or ready: not yet asked to retire
    pub fn is_connected(&self) -> bool {
        matches!(self.status, WorkerStatus::Starting | WorkerStatus::Ready)
    }

    pub fn is_ready(&self) -> bool {
        self.status == WorkerStatus::Ready
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
