// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process adapters

mod child;
mod protocol;

pub use child::{parse_retire_signal, ChildProcessAdapter, WORKER_ID_ENV};
pub use protocol::{parse_line, WorkerLine};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcess, FakeProcessAdapter, ProcessCall};

use async_trait::async_trait;
use nodown_core::WorkerId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("worker process not found: {0}")]
    NotFound(WorkerId),
    #[error("failed to signal worker {id}: {message}")]
    SignalFailed { id: WorkerId, message: String },
    #[error("invalid signal name: {0}")]
    InvalidSignal(String),
}

/// What to run for every worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// A started worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedProcess {
    pub pid: Option<u32>,
}

/// Adapter for the OS process layer.
///
/// Readiness, exits and control messages are not returned from these calls;
/// implementations deliver them as [`ProcessEvent`](nodown_core::ProcessEvent)s
/// on the channel they were constructed with, exactly once per occurrence.
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Start a worker process tagged with `id`
    async fn spawn(&self, id: WorkerId, command: &WorkerCommand)
        -> Result<SpawnedProcess, ProcessError>;

    /// Ask a worker to stop accepting work and exit
    async fn retire(&self, id: WorkerId) -> Result<(), ProcessError>;

    /// Terminate a worker immediately
    async fn kill(&self, id: WorkerId) -> Result<(), ProcessError>;
}

/// Number of processing units available to this process, at least 1
pub fn available_processing_units() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
