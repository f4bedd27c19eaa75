// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nodown supervisor process: configuration, lifecycle and signal wiring

pub mod config;
pub mod lifecycle;
pub mod signals;

pub use config::{Config, FileConfig, Overrides};
pub use lifecycle::{
    read_pid, setup_logging, signal_supervisor, startup, wait_for_exit, write_startup_marker,
    Daemon, LifecycleError, PidFile, STARTUP_MARKER_PREFIX,
};
