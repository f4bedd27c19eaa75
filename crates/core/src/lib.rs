// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nodown-core: data model of the nodown supervisor
//!
//! This crate provides:
//! - The worker state machine and exit classification
//! - The ordered worker registry
//! - Restart phases and the restart admission policy
//! - Process notifications and triggers
//! - Pool configuration

pub mod config;
pub mod event;
pub mod registry;
pub mod restart;
pub mod worker;

pub use config::{PoolConfig, RetryPolicy, DEFAULT_READY_TIMEOUT, DEFAULT_RETIRE_TIMEOUT};
pub use event::{ControlMessage, ExitStatus, ProcessEvent, RestartReason, Trigger};
pub use registry::Registry;
pub use restart::{Admission, RestartPhase, RestartQueue};
pub use worker::{ExitKind, Worker, WorkerId, WorkerStatus};
