// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor configuration
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! command-line overrides.

use crate::lifecycle::LifecycleError;
use nix::sys::signal::Signal;
use nodown_adapters::{available_processing_units, parse_retire_signal, WorkerCommand};
use nodown_core::{PoolConfig, RetryPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_RETIRE_SIGNAL: &str = "SIGTERM";

/// Contents of a configuration file; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub command: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub workers: Option<usize>,
    pub retire_signal: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub ready_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub retire_timeout: Option<Duration>,
    pub pid_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub spawn_retry: Option<RetryPolicy>,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn read(path: &Path) -> Result<Self, LifecycleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::ConfigRead(path.to_path_buf(), e))?;
        Self::parse(&content).map_err(|e| LifecycleError::ConfigParse(path.to_path_buf(), e))
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub workers: Option<usize>,
    pub retire_signal: Option<String>,
    pub ready_timeout: Option<Duration>,
    pub retire_timeout: Option<Duration>,
    pub pid_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Fully resolved and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub command: WorkerCommand,
    pub pool: PoolConfig,
    pub retire_signal: Option<Signal>,
    pub pid_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Read the optional config file and apply the overrides on top
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self, LifecycleError> {
        let file = match path {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, overrides)
    }

    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self, LifecycleError> {
        let argv = if overrides.command.is_empty() {
            file.command.unwrap_or_default()
        } else {
            overrides.command
        };
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(LifecycleError::MissingCommand)?;

        let mut command = WorkerCommand::new(program).args(argv);
        for (key, value) in file.env.into_iter().chain(overrides.env) {
            command = command.env(key, value);
        }
        if let Some(cwd) = overrides.cwd.or(file.cwd) {
            command = command.cwd(cwd);
        }

        let workers = overrides
            .workers
            .or(file.workers)
            .unwrap_or_else(available_processing_units);
        if workers == 0 {
            return Err(LifecycleError::InvalidWorkers);
        }

        let signal_name = overrides
            .retire_signal
            .or(file.retire_signal)
            .unwrap_or_else(|| DEFAULT_RETIRE_SIGNAL.to_string());
        let retire_signal = parse_retire_signal(&signal_name)?;

        let mut pool = PoolConfig::with_size(workers);
        if let Some(timeout) = overrides.ready_timeout.or(file.ready_timeout) {
            pool.ready_timeout = timeout;
        }
        if let Some(timeout) = overrides.retire_timeout.or(file.retire_timeout) {
            pool.retire_timeout = timeout;
        }
        if let Some(retry) = file.spawn_retry {
            pool.spawn_retry = retry;
        }

        Ok(Self {
            command,
            pool,
            retire_signal,
            pid_file: overrides.pid_file.or(file.pid_file),
            log_file: overrides.log_file.or(file.log_file),
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
