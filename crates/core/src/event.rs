// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifications from the process layer and restart triggers

use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a worker process ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code, when the process exited on its own
    pub code: Option<i32>,
    /// Terminating signal number, when the process was killed by one
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (_, Some(signal)) => write!(f, "signal {}", signal),
            (Some(code), None) => write!(f, "exit code {}", code),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Application-level messages a worker can send to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Ask for a rolling restart of the whole pool
    Reload,
}

/// Notifications delivered by the process layer, one per occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessEvent {
    /// Worker finished startup and accepts work
    Ready {
        id: WorkerId,
        address: Option<String>,
    },
    /// Worker process is gone
    Exited { id: WorkerId, status: ExitStatus },
    /// Worker sent a control message
    Message {
        id: WorkerId,
        message: ControlMessage,
    },
}

/// Why a rolling restart was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartReason {
    /// Operator sent the restart signal (SIGHUP)
    Signal,
    /// A worker sent a reload control message
    WorkerRequest(WorkerId),
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Signal => write!(f, "restart signal"),
            RestartReason::WorkerRequest(id) => write!(f, "reload request from worker {}", id),
        }
    }
}

/// External inputs to the supervisor besides process notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Restart(RestartReason),
    Shutdown,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
