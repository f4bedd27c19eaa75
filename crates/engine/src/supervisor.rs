// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart orchestrator
//!
//! The supervisor is a single task that owns the pool. It reads process
//! notifications and operator triggers, applies each one completely before
//! reading the next, and runs at most one rolling restart at a time.

use crate::error::SupervisorError;
use crate::pool::{PoolManager, PoolOutcome};
use nodown_adapters::ProcessAdapter;
use nodown_core::{
    Admission, PoolConfig, ProcessEvent, RestartPhase, RestartQueue, RestartReason, Trigger,
    WorkerId,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

/// One input read by the supervisor loop
enum Input {
    Event(Option<ProcessEvent>),
    Trigger(Option<Trigger>),
    Deadline,
}

pub struct Supervisor<P> {
    pool: PoolManager<P>,
    events: mpsc::Receiver<ProcessEvent>,
    triggers: mpsc::Receiver<Trigger>,
    config: PoolConfig,
    queue: RestartQueue,
    phase: RestartPhase,
    /// Phases entered by the latest rolling restart
    phase_log: Vec<RestartPhase>,
    sequences: u64,
    shutdown_requested: bool,
    triggers_closed: bool,
}

impl<P: ProcessAdapter> Supervisor<P> {
    pub fn new(
        pool: PoolManager<P>,
        events: mpsc::Receiver<ProcessEvent>,
        triggers: mpsc::Receiver<Trigger>,
        config: PoolConfig,
    ) -> Self {
        Self {
            pool,
            events,
            triggers,
            config,
            queue: RestartQueue::new(),
            phase: RestartPhase::Idle,
            phase_log: Vec::new(),
            sequences: 0,
            shutdown_requested: false,
            triggers_closed: false,
        }
    }

    pub fn pool(&self) -> &PoolManager<P> {
        &self.pool
    }

    pub fn phase(&self) -> RestartPhase {
        self.phase
    }

    pub fn phase_log(&self) -> &[RestartPhase] {
        &self.phase_log
    }

    pub fn restart_pending(&self) -> bool {
        self.queue.has_pending()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Ask for a rolling restart.
    ///
    /// While a sequence runs, one follow-up is queued and later requests are
    /// folded into it.
    pub fn request_restart(&mut self, reason: RestartReason) -> Admission {
        let admission = self.queue.request();
        match admission {
            Admission::Scheduled => tracing::info!(%reason, "rolling restart scheduled"),
            Admission::Queued => {
                tracing::info!(%reason, "rolling restart in progress, queued another")
            }
            Admission::Coalesced => {
                tracing::debug!(%reason, "rolling restart already queued")
            }
        }
        admission
    }

    /// Run until shutdown is requested or a fatal error occurs.
    ///
    /// Remaining workers are always retired before returning.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let result = self.serve().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "supervisor failed, stopping workers");
        }
        let stopped = self.shutdown().await;
        tracing::info!("supervisor stopped");
        result.and(stopped)
    }

    async fn serve(&mut self) -> Result<(), SupervisorError> {
        self.bootstrap().await?;
        while !self.shutdown_requested {
            if self.queue.has_pending() {
                self.rolling_restart().await?;
            } else {
                self.step().await?;
            }
        }
        Ok(())
    }

    /// Read and apply one input
    pub async fn step(&mut self) -> Result<(), SupervisorError> {
        let input = self.recv_input(None).await;
        self.apply(input).await
    }

    /// Spawn the configured number of workers and wait until all are ready.
    ///
    /// Workers that exit before readiness are replaced by the pool. With a
    /// ready timeout, workers still starting when it expires are killed.
    pub async fn bootstrap(&mut self) -> Result<(), SupervisorError> {
        let size = self.config.size.max(1);
        let started = Instant::now();
        tracing::info!(workers = size, "starting worker pool");

        for _ in 0..size {
            self.pool.spawn().await?;
        }

        let mut deadline = self.deadline(self.config.ready_deadline());
        while self.pool.registry().ready_count() < size && !self.shutdown_requested {
            match self.recv_input(deadline).await {
                Input::Deadline => {
                    for id in self.pool.starting() {
                        tracing::warn!(worker = %id, "worker not ready in time, killing");
                        self.pool.kill(id).await;
                    }
                    deadline = self.deadline(self.config.ready_deadline());
                }
                input => self.apply(input).await?,
            }
        }

        if !self.shutdown_requested {
            tracing::info!(
                workers = size,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "worker pool ready"
            );
        }
        Ok(())
    }

    /// Run the pending restart sequence, and the follow-up queued while it
    /// ran, if any.
    pub async fn rolling_restart(&mut self) -> Result<(), SupervisorError> {
        self.phase_log.clear();

        while self.queue.start() {
            self.sequences += 1;
            let span = tracing::info_span!("restart", sequence = self.sequences);
            let result = self.run_sequence().instrument(span).await;
            self.queue.finish();
            result?;
            self.set_phase(RestartPhase::Done);
            if self.shutdown_requested {
                break;
            }
        }

        self.set_phase(RestartPhase::Idle);
        Ok(())
    }

    async fn run_sequence(&mut self) -> Result<(), SupervisorError> {
        let snapshot = self.pool.snapshot();
        let started = Instant::now();
        tracing::info!(workers = snapshot.len(), "rolling restart started");

        for old in snapshot {
            if self.shutdown_requested {
                tracing::info!("shutdown requested, abandoning rolling restart");
                return Ok(());
            }
            self.replace(old).await?;
        }

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rolling restart finished"
        );
        Ok(())
    }

    /// Replace one worker: start its successor, wait until the successor is
    /// ready, then retire the old worker and wait for its exit.
    async fn replace(&mut self, old: WorkerId) -> Result<(), SupervisorError> {
        if !self.pool.registry().is_connected(old) {
            tracing::debug!(worker = %old, "worker gone, skipping");
            return Ok(());
        }

        let ready = loop {
            self.set_phase(RestartPhase::Spawning);
            let (replacement, readiness) = self.pool.spawn().await?;
            self.pool.mark_superseded(old, replacement);

            self.set_phase(RestartPhase::AwaitingReady);
            let timeout = self.config.ready_deadline();
            match self.await_signal(readiness, replacement, timeout).await? {
                None => return Ok(()),
                Some(Ok(ready)) => break ready,
                Some(Err(failure)) => {
                    tracing::warn!(worker = %old, error = %failure, "replacement failed, spawning another");
                }
            }
        };

        if !self.pool.registry().is_connected(old) {
            tracing::info!(
                worker = %old,
                replacement = %ready.id,
                "worker exited before retirement"
            );
            self.set_phase(RestartPhase::Advancing);
            return Ok(());
        }

        self.set_phase(RestartPhase::Retiring);
        let retirement = self.pool.retire_one(old).await?;

        self.set_phase(RestartPhase::AwaitingExit);
        let timeout = self.config.retire_deadline();
        if let Some(status) = self.await_signal(retirement, old, timeout).await? {
            tracing::info!(worker = %old, replacement = %ready.id, %status, "worker replaced");
        }

        self.set_phase(RestartPhase::Advancing);
        Ok(())
    }

    /// Wait for a fire-once signal about `worker` while still applying
    /// events and triggers.
    ///
    /// When `timeout` expires the worker is killed once and the wait goes
    /// on until its exit is observed. Returns `None` if shutdown was
    /// requested first.
    async fn await_signal<F>(
        &mut self,
        mut signal: F,
        worker: WorkerId,
        timeout: Option<Duration>,
    ) -> Result<Option<F::Output>, SupervisorError>
    where
        F: Future + Unpin,
    {
        let mut deadline = self.deadline(timeout);

        loop {
            if self.shutdown_requested {
                return Ok(None);
            }

            let input = tokio::select! {
                biased;
                output = &mut signal => return Ok(Some(output)),
                input = self.recv_input(deadline) => input,
            };

            match input {
                Input::Deadline => {
                    tracing::warn!(
                        worker = %worker,
                        timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64),
                        phase = %self.phase,
                        "worker timed out, killing"
                    );
                    deadline = None;
                    self.pool.kill(worker).await;
                }
                input => self.apply(input).await?,
            }
        }
    }

    async fn recv_input(&mut self, deadline: Option<Instant>) -> Input {
        let triggers_open = !self.triggers_closed;
        tokio::select! {
            biased;
            trigger = self.triggers.recv(), if triggers_open => Input::Trigger(trigger),
            event = self.events.recv() => Input::Event(event),
            _ = sleep_until(deadline) => Input::Deadline,
        }
    }

    async fn apply(&mut self, input: Input) -> Result<(), SupervisorError> {
        match input {
            Input::Trigger(Some(Trigger::Restart(reason))) => {
                self.request_restart(reason);
            }
            Input::Trigger(Some(Trigger::Shutdown)) => {
                tracing::info!("shutdown requested");
                self.shutdown_requested = true;
            }
            Input::Trigger(None) => {
                tracing::info!("trigger channel closed, shutting down");
                self.triggers_closed = true;
                self.shutdown_requested = true;
            }
            Input::Event(Some(event)) => {
                if let PoolOutcome::ReloadRequested(id) = self.pool.handle_event(event).await? {
                    self.request_restart(RestartReason::WorkerRequest(id));
                }
            }
            Input::Event(None) => return Err(SupervisorError::EventsClosed),
            Input::Deadline => {}
        }
        Ok(())
    }

    /// Retire every remaining worker and wait for all of them to exit.
    ///
    /// Workers still alive after the retire timeout are killed.
    async fn shutdown(&mut self) -> Result<(), SupervisorError> {
        self.queue.clear();
        let retiring = self.pool.retire_all().await;
        tracing::info!(workers = retiring, "stopping worker pool");

        let mut deadline = self.deadline(self.config.retire_deadline());
        while !self.pool.registry().is_empty() {
            match self.recv_input(deadline).await {
                Input::Deadline => {
                    for id in self.pool.registry().ids() {
                        tracing::warn!(worker = %id, "worker did not exit in time, killing");
                        self.pool.kill(id).await;
                    }
                    deadline = None;
                }
                Input::Event(Some(event)) => {
                    if let Err(e) = self.pool.handle_event(event).await {
                        tracing::warn!(error = %e, "error while stopping workers");
                    }
                }
                Input::Event(None) => return Err(SupervisorError::EventsClosed),
                Input::Trigger(None) => self.triggers_closed = true,
                Input::Trigger(Some(trigger)) => {
                    tracing::debug!(?trigger, "ignoring trigger during shutdown");
                }
            }
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: RestartPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "restart phase");
        self.phase = phase;
        self.phase_log.push(phase);
    }

    fn deadline(&self, timeout: Option<Duration>) -> Option<Instant> {
        timeout.map(|t| Instant::now() + t)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
