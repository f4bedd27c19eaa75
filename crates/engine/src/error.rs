// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the pool and the supervisor

use nodown_adapters::ProcessError;
use nodown_core::WorkerId;
use thiserror::Error;

/// Errors from pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn worker after {attempts} attempts: {source}")]
    SpawnExhausted {
        attempts: u32,
        #[source]
        source: ProcessError,
    },
    #[error("{failures} workers in a row exited before becoming ready")]
    CrashLoop { failures: u32 },
    #[error("worker not found: {0}")]
    UnknownWorker(WorkerId),
    #[error("worker {0} is already retiring")]
    AlreadyRetiring(WorkerId),
}

/// Errors that stop the supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("process event channel closed")]
    EventsClosed,
}
