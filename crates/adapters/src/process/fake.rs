// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ProcessAdapter, ProcessError, SpawnedProcess, WorkerCommand};
use async_trait::async_trait;
use nodown_core::{ControlMessage, ExitStatus, ProcessEvent, WorkerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Signal number reported for killed fake processes
const SIGKILL: i32 = 9;

/// Recorded process call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    Spawn { id: WorkerId, program: String },
    Retire { id: WorkerId },
    Kill { id: WorkerId },
}

/// Fake process state
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub pid: u32,
    pub program: String,
    pub alive: bool,
    pub retired: bool,
}

struct FakeState {
    processes: HashMap<WorkerId, FakeProcess>,
    calls: Vec<ProcessCall>,
    auto_ready: bool,
    exit_on_retire: bool,
    fail_spawns: u32,
    hang_spawns: u32,
    next_pid: u32,
}

/// Fake process adapter for testing.
///
/// By default every spawned process reports readiness right away and every
/// retired process exits with code 0, so sequences run to completion without
/// a script. Individual behaviours can be switched off or injected.
#[derive(Clone)]
pub struct FakeProcessAdapter {
    state: Arc<Mutex<FakeState>>,
    events: mpsc::Sender<ProcessEvent>,
}

impl FakeProcessAdapter {
    pub fn new(events: mpsc::Sender<ProcessEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                processes: HashMap::new(),
                calls: Vec::new(),
                auto_ready: true,
                exit_on_retire: true,
                fail_spawns: 0,
                hang_spawns: 0,
                next_pid: 1000,
            })),
            events,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn emit(&self, event: ProcessEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(error = %e, "fake adapter could not deliver event");
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// Ids of successful and failed spawn attempts, in order
    pub fn spawned(&self) -> Vec<WorkerId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProcessCall::Spawn { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn retired(&self) -> Vec<WorkerId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProcessCall::Retire { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<WorkerId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProcessCall::Kill { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    /// Get a process by worker id
    pub fn process(&self, id: WorkerId) -> Option<FakeProcess> {
        self.with_state(|s| s.processes.get(&id).cloned())
    }

    /// Whether new processes report readiness on their own
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.with_state(|s| s.auto_ready = auto_ready);
    }

    /// Whether retired processes exit on their own
    pub fn set_exit_on_retire(&self, exit_on_retire: bool) {
        self.with_state(|s| s.exit_on_retire = exit_on_retire);
    }

    /// Make the next `count` spawn attempts fail
    pub fn fail_next_spawns(&self, count: u32) {
        self.with_state(|s| s.fail_spawns = count);
    }

    /// Make the next `count` spawned processes never report readiness
    pub fn hang_next_spawns(&self, count: u32) {
        self.with_state(|s| s.hang_spawns = count);
    }

    /// Report readiness for a process
    pub fn report_ready(&self, id: WorkerId, address: Option<&str>) {
        self.emit(ProcessEvent::Ready {
            id,
            address: address.map(str::to_string),
        });
    }

    /// Make a process request a rolling restart
    pub fn request_reload(&self, id: WorkerId) {
        self.emit(ProcessEvent::Message {
            id,
            message: ControlMessage::Reload,
        });
    }

    /// Make a process exit with the given status
    pub fn exit(&self, id: WorkerId, status: ExitStatus) {
        self.with_state(|s| {
            if let Some(process) = s.processes.get_mut(&id) {
                process.alive = false;
            }
        });
        self.emit(ProcessEvent::Exited { id, status });
    }

    /// Make a process die from a signal
    pub fn crash(&self, id: WorkerId, signal: i32) {
        self.exit(id, ExitStatus::signaled(signal));
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn spawn(
        &self,
        id: WorkerId,
        command: &WorkerCommand,
    ) -> Result<SpawnedProcess, ProcessError> {
        let (result, ready) = self.with_state(|s| {
            s.calls.push(ProcessCall::Spawn {
                id,
                program: command.program.clone(),
            });

            if s.fail_spawns > 0 {
                s.fail_spawns -= 1;
                return (
                    Err(ProcessError::SpawnFailed("injected failure".to_string())),
                    false,
                );
            }

            s.next_pid += 1;
            let pid = s.next_pid;
            s.processes.insert(
                id,
                FakeProcess {
                    pid,
                    program: command.program.clone(),
                    alive: true,
                    retired: false,
                },
            );

            let ready = if s.hang_spawns > 0 {
                s.hang_spawns -= 1;
                false
            } else {
                s.auto_ready
            };
            (Ok(SpawnedProcess { pid: Some(pid) }), ready)
        });

        if ready {
            self.report_ready(id, None);
        }
        result
    }

    async fn retire(&self, id: WorkerId) -> Result<(), ProcessError> {
        let exits = self.with_state(|s| {
            s.calls.push(ProcessCall::Retire { id });
            match s.processes.get_mut(&id) {
                Some(process) if process.alive => {
                    process.retired = true;
                    Ok(s.exit_on_retire)
                }
                _ => Err(ProcessError::NotFound(id)),
            }
        })?;

        if exits {
            self.exit(id, ExitStatus::code(0));
        }
        Ok(())
    }

    async fn kill(&self, id: WorkerId) -> Result<(), ProcessError> {
        let alive = self.with_state(|s| {
            s.calls.push(ProcessCall::Kill { id });
            s.processes.get(&id).is_some_and(|p| p.alive)
        });

        if !alive {
            return Err(ProcessError::NotFound(id));
        }
        self.crash(id, SIGKILL);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
