// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool manager: owns the worker registry and applies process notifications
//!
//! The pool is the only writer of the [`Registry`]. Every mutation happens
//! either in one of its operations or while applying a single
//! [`ProcessEvent`], so mutations never interleave.

use crate::error::PoolError;
use crate::journal::{Journal, PoolEntry};
use nodown_adapters::{ProcessAdapter, WorkerCommand};
use nodown_core::{
    ControlMessage, ExitKind, ExitStatus, ProcessEvent, Registry, RetryPolicy, Worker, WorkerId,
    WorkerStatus,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

/// A worker that reported readiness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyWorker {
    pub id: WorkerId,
    pub address: Option<String>,
}

/// A worker exited before it reported readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker {id} exited before reporting readiness ({status})")]
pub struct StartupFailure {
    pub id: WorkerId,
    pub status: ExitStatus,
}

type ReadySender = oneshot::Sender<Result<ReadyWorker, StartupFailure>>;

/// Resolves once, when the spawned worker reports readiness or exits first
#[derive(Debug)]
pub struct Readiness {
    id: WorkerId,
    rx: oneshot::Receiver<Result<ReadyWorker, StartupFailure>>,
}

impl Future for Readiness {
    type Output = Result<ReadyWorker, StartupFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or(Err(StartupFailure {
                id,
                status: ExitStatus::default(),
            }))
        })
    }
}

/// Resolves once, with the exit status of a retired worker
#[derive(Debug)]
pub struct Retirement {
    rx: oneshot::Receiver<ExitStatus>,
}

impl Future for Retirement {
    type Output = ExitStatus;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_default())
    }
}

#[derive(Default)]
struct Waiters {
    ready: Option<ReadySender>,
    exit: Option<oneshot::Sender<ExitStatus>>,
}

/// What applying a process event did to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    Ready(WorkerId),
    /// A retiring worker exited
    Retired { id: WorkerId, status: ExitStatus },
    /// A starting worker exited; whoever awaits its readiness compensates
    StartupFailed { id: WorkerId, status: ExitStatus },
    /// A worker being replaced exited; its replacement is already starting
    Lost { id: WorkerId, status: ExitStatus },
    /// A worker exited unexpectedly and was replaced
    Respawned {
        crashed: WorkerId,
        replacement: WorkerId,
    },
    ReloadRequested(WorkerId),
    Ignored,
}

/// Owns the live workers and the process adapter
pub struct PoolManager<P> {
    adapter: P,
    command: WorkerCommand,
    registry: Registry,
    waiters: HashMap<WorkerId, Waiters>,
    retry: RetryPolicy,
    /// Workers in a row that exited before becoming ready
    startup_failures: u32,
    journal: Journal,
}

impl<P: ProcessAdapter> PoolManager<P> {
    pub fn new(adapter: P, command: WorkerCommand, retry: RetryPolicy) -> Self {
        Self {
            adapter,
            command,
            registry: Registry::new(),
            waiters: HashMap::new(),
            retry,
            startup_failures: 0,
            journal: Journal::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Connected workers in ascending id order
    pub fn snapshot(&self) -> Vec<WorkerId> {
        self.registry.snapshot()
    }

    pub fn starting(&self) -> Vec<WorkerId> {
        self.registry
            .iter()
            .filter(|w| w.status == WorkerStatus::Starting)
            .map(|w| w.id)
            .collect()
    }

    /// Start a new worker and register it as starting.
    ///
    /// Failed spawn attempts are retried with backoff; each attempt burns a
    /// fresh id. Dropping the returned [`Readiness`] hands recovery of a
    /// failed startup back to the pool.
    pub async fn spawn(&mut self) -> Result<(WorkerId, Readiness), PoolError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let id = self.registry.allocate_id();

            match self.adapter.spawn(id, &self.command).await {
                Ok(spawned) => {
                    self.registry.insert(Worker::new(id, spawned.pid));
                    let (tx, rx) = oneshot::channel();
                    self.waiters.insert(
                        id,
                        Waiters {
                            ready: Some(tx),
                            exit: None,
                        },
                    );
                    self.journal.record(PoolEntry::Spawned(id));
                    tracing::debug!(worker = %id, pid = ?spawned.pid, "worker spawned");
                    return Ok((id, Readiness { id, rx }));
                }
                Err(e) if attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        worker = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "spawn failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(worker = %id, attempt, error = %e, "spawn failed, giving up");
                    return Err(PoolError::SpawnExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Ask a worker to stop accepting work and exit.
    ///
    /// The retirement is recorded before the request is sent, so the exit
    /// that follows is classified as orchestrated whatever its cause.
    pub async fn retire_one(&mut self, id: WorkerId) -> Result<Retirement, PoolError> {
        let worker = self
            .registry
            .get_mut(id)
            .ok_or(PoolError::UnknownWorker(id))?;
        if !worker.begin_retire() {
            return Err(PoolError::AlreadyRetiring(id));
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.entry(id).or_default().exit = Some(tx);
        self.journal.record(PoolEntry::RetireRequested(id));

        if let Err(e) = self.adapter.retire(id).await {
            // The exit notification is still on its way
            tracing::warn!(worker = %id, error = %e, "retire request failed, waiting for exit");
        }

        Ok(Retirement { rx })
    }

    /// Start exactly one replacement for a worker that exited unexpectedly
    pub async fn respawn_crashed(&mut self, crashed: WorkerId) -> Result<WorkerId, PoolError> {
        let (replacement, _readiness) = self.spawn().await?;
        self.journal.record(PoolEntry::Respawned {
            crashed,
            replacement,
        });
        tracing::info!(crashed = %crashed, replacement = %replacement, "respawned crashed worker");
        Ok(replacement)
    }

    /// Record that `replacement` is being started to take over from `old`
    pub fn mark_superseded(&mut self, old: WorkerId, replacement: WorkerId) {
        if let Some(worker) = self.registry.get_mut(old) {
            worker.superseded_by = Some(replacement);
        }
    }

    /// Terminate a worker that overran a bounded wait
    pub async fn kill(&mut self, id: WorkerId) {
        if let Err(e) = self.adapter.kill(id).await {
            tracing::warn!(worker = %id, error = %e, "failed to kill worker");
        }
    }

    /// Retire every connected worker; exits arrive as process events
    pub async fn retire_all(&mut self) -> usize {
        let mut retired = 0;
        for id in self.snapshot() {
            if self.retire_one(id).await.is_ok() {
                retired += 1;
            }
        }
        retired
    }

    /// Apply one notification from the process layer
    pub async fn handle_event(&mut self, event: ProcessEvent) -> Result<PoolOutcome, PoolError> {
        match event {
            ProcessEvent::Ready { id, address } => Ok(self.on_ready(id, address)),
            ProcessEvent::Message {
                id,
                message: ControlMessage::Reload,
            } => {
                if self.registry.is_connected(id) {
                    tracing::info!(worker = %id, "worker requested a rolling restart");
                    Ok(PoolOutcome::ReloadRequested(id))
                } else {
                    tracing::debug!(worker = %id, "ignoring reload from disconnected worker");
                    Ok(PoolOutcome::Ignored)
                }
            }
            ProcessEvent::Exited { id, status } => self.on_exit(id, status).await,
        }
    }

    fn on_ready(&mut self, id: WorkerId, address: Option<String>) -> PoolOutcome {
        let Some(worker) = self.registry.get_mut(id) else {
            tracing::debug!(worker = %id, "ignoring readiness of unknown worker");
            return PoolOutcome::Ignored;
        };
        if !worker.mark_ready(address.clone()) {
            tracing::debug!(worker = %id, status = ?worker.status, "ignoring readiness");
            return PoolOutcome::Ignored;
        }

        self.startup_failures = 0;
        self.journal.record(PoolEntry::Ready(id));
        tracing::info!(worker = %id, address = ?address, "worker ready");

        if let Some(tx) = self.waiters.get_mut(&id).and_then(|w| w.ready.take()) {
            let _ = tx.send(Ok(ReadyWorker { id, address }));
        }
        PoolOutcome::Ready(id)
    }

    async fn on_exit(&mut self, id: WorkerId, status: ExitStatus) -> Result<PoolOutcome, PoolError> {
        let Some(mut worker) = self.registry.remove(id) else {
            tracing::debug!(worker = %id, "ignoring exit of unknown worker");
            return Ok(PoolOutcome::Ignored);
        };
        let waiters = self.waiters.remove(&id).unwrap_or_default();
        let was_starting = worker.status == WorkerStatus::Starting;
        let kind = worker.mark_exited();
        self.journal.record(PoolEntry::Exited { id, kind });

        if kind == ExitKind::Orchestrated {
            tracing::info!(worker = %id, %status, "worker retired");
            if let Some(tx) = waiters.exit {
                let _ = tx.send(status);
            }
            return Ok(PoolOutcome::Retired { id, status });
        }

        if was_starting {
            self.startup_failures += 1;
            tracing::warn!(
                worker = %id,
                %status,
                failures = self.startup_failures,
                "worker exited before becoming ready"
            );
            if self.startup_failures >= self.retry.attempts.max(1) {
                return Err(PoolError::CrashLoop {
                    failures: self.startup_failures,
                });
            }
        }

        if let Some(tx) = waiters.ready.filter(|tx| !tx.is_closed()) {
            let _ = tx.send(Err(StartupFailure { id, status }));
            return Ok(PoolOutcome::StartupFailed { id, status });
        }

        if let Some(replacement) = worker.superseded_by {
            tracing::warn!(
                worker = %id,
                replacement = %replacement,
                %status,
                "worker exited while being replaced"
            );
            return Ok(PoolOutcome::Lost { id, status });
        }

        tracing::warn!(worker = %id, %status, "worker exited unexpectedly");
        let replacement = self.respawn_crashed(id).await?;
        Ok(PoolOutcome::Respawned {
            crashed: id,
            replacement,
        })
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
