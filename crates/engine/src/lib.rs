// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nodown supervision engine: the worker pool and the restart orchestrator

mod error;
pub mod journal;
mod pool;
mod supervisor;

pub use error::{PoolError, SupervisorError};
pub use journal::{Journal, PoolEntry, JOURNAL_CAPACITY};
pub use pool::{PoolManager, PoolOutcome, Readiness, ReadyWorker, Retirement, StartupFailure};
pub use supervisor::Supervisor;
