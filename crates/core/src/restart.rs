// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling restart phases and trigger admission

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named states of a restart sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPhase {
    /// No sequence running
    Idle,
    /// Starting the replacement for the current worker
    Spawning,
    /// Waiting for the replacement to report readiness
    AwaitingReady,
    /// Sending the retirement request to the old worker
    Retiring,
    /// Waiting for the old worker to exit
    AwaitingExit,
    /// Step finished, moving to the next worker of the snapshot
    Advancing,
    /// Every worker of the snapshot was handled
    Done,
}

impl fmt::Display for RestartPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestartPhase::Idle => "idle",
            RestartPhase::Spawning => "spawning",
            RestartPhase::AwaitingReady => "awaiting_ready",
            RestartPhase::Retiring => "retiring",
            RestartPhase::AwaitingExit => "awaiting_exit",
            RestartPhase::Advancing => "advancing",
            RestartPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened to a restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Nothing running; a sequence will start
    Scheduled,
    /// A sequence is running; one more will run after it
    Queued,
    /// A follow-up is already queued; this request is folded into it
    Coalesced,
}

/// Admission policy for restart requests.
///
/// At most one sequence is active. A request during an active sequence
/// queues a single follow-up; any further requests coalesce into it.
#[derive(Debug, Default, Clone)]
pub struct RestartQueue {
    active: bool,
    pending: bool,
}

impl RestartQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) -> Admission {
        match (self.active, self.pending) {
            (_, true) => Admission::Coalesced,
            (false, false) => {
                self.pending = true;
                Admission::Scheduled
            }
            (true, false) => {
                self.pending = true;
                Admission::Queued
            }
        }
    }

    /// Claim the pending request, if any, and mark a sequence active
    pub fn start(&mut self) -> bool {
        if self.active || !self.pending {
            return false;
        }
        self.pending = false;
        self.active = true;
        true
    }

    pub fn finish(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Drop a queued request without running it (shutdown)
    pub fn clear(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
