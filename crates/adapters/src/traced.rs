// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability

use crate::process::{ProcessAdapter, ProcessError, SpawnedProcess, WorkerCommand};
use async_trait::async_trait;
use nodown_core::WorkerId;
use tracing::Instrument;

/// Wrapper that adds tracing to any ProcessAdapter
#[derive(Clone)]
pub struct TracedProcessAdapter<P> {
    inner: P,
}

impl<P> TracedProcessAdapter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: ProcessAdapter> ProcessAdapter for TracedProcessAdapter<P> {
    async fn spawn(
        &self,
        id: WorkerId,
        command: &WorkerCommand,
    ) -> Result<SpawnedProcess, ProcessError> {
        let span = tracing::info_span!("process.spawn", worker = %id, program = %command.program);

        async {
            tracing::info!(args = command.args.len(), env_count = command.env.len(), "starting");

            // Precondition: cwd must exist
            if let Some(cwd) = &command.cwd {
                if !cwd.exists() {
                    tracing::error!(cwd = %cwd.display(), "working directory does not exist");
                    return Err(ProcessError::SpawnFailed(format!(
                        "working directory does not exist: {}",
                        cwd.display()
                    )));
                }
            }

            let start = std::time::Instant::now();
            let result = self.inner.spawn(id, command).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(spawned) => tracing::info!(
                    pid = ?spawned.pid,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "process started"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "spawn failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn retire(&self, id: WorkerId) -> Result<(), ProcessError> {
        let span = tracing::info_span!("process.retire", worker = %id);

        async {
            let result = self.inner.retire(id).await;
            match &result {
                Ok(()) => tracing::info!("retire requested"),
                // The worker may have exited on its own already
                Err(e) => tracing::warn!(error = %e, "retire failed (may be expected)"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn kill(&self, id: WorkerId) -> Result<(), ProcessError> {
        let span = tracing::info_span!("process.kill", worker = %id);

        async {
            let result = self.inner.kill(id).await;
            match &result {
                Ok(()) => tracing::warn!("killed"),
                Err(e) => tracing::warn!(error = %e, "kill failed (may be expected)"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
