// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool configuration

mod retry;

pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on the readiness wait of a new worker
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the exit wait of a retiring worker
pub const DEFAULT_RETIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings that govern the pool and its restart sequences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers to keep alive
    pub size: usize,
    /// How long a new worker may take to report readiness; zero waits forever
    #[serde(with = "humantime_serde")]
    pub ready_timeout: Duration,
    /// How long a retiring worker may take to exit before it is killed; zero waits forever
    #[serde(with = "humantime_serde")]
    pub retire_timeout: Duration,
    pub spawn_retry: RetryPolicy,
}

impl PoolConfig {
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            retire_timeout: DEFAULT_RETIRE_TIMEOUT,
            spawn_retry: RetryPolicy::default(),
        }
    }

    pub fn ready_deadline(&self) -> Option<Duration> {
        non_zero(self.ready_timeout)
    }

    pub fn retire_deadline(&self) -> Option<Duration> {
        non_zero(self.retire_timeout)
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
