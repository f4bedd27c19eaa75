// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor lifecycle management: startup, shutdown, pid file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use nodown_adapters::{ChildProcessAdapter, ProcessError, TracedProcessAdapter};
use nodown_core::Trigger;
use nodown_engine::{PoolManager, Supervisor, SupervisorError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::signals::SignalStreams;

/// Supervisor with concrete adapter types (wrapped with tracing)
pub type DaemonSupervisor = Supervisor<TracedProcessAdapter<ChildProcessAdapter>>;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- nodown: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- nodown: starting (pid: ";

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to read config {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("invalid config {0}: {1}")]
    ConfigParse(PathBuf, #[source] toml::de::Error),

    #[error("no worker command given")]
    MissingCommand,

    #[error("workers must be at least 1")]
    InvalidWorkers,

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to acquire lock: supervisor already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to read pid file {0}: {1}")]
    PidFileRead(PathBuf, #[source] std::io::Error),

    #[error("invalid pid file {0}")]
    InvalidPidFile(PathBuf),

    #[error("failed to signal supervisor (pid {pid}): {source}")]
    SignalFailed {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("log file path has no file name: {0}")]
    InvalidLogFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Exclusively locked pid file, removed on release
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    file: File,
}

impl PidFile {
    /// Lock the pid file and write the current pid into it.
    ///
    /// The file is only truncated once the lock is held, so a running
    /// supervisor's pid is never clobbered.
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(LifecycleError::LockFailed)?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file; the lock goes with the handle
    pub fn release(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Read the supervisor pid from a pid file
pub fn read_pid(path: &Path) -> Result<i32, LifecycleError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LifecycleError::PidFileRead(path.to_path_buf(), e))?;
    content
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| LifecycleError::InvalidPidFile(path.to_path_buf()))
}

/// Send `sig` to the supervisor named by the pid file, returning its pid
pub fn signal_supervisor(pid_file: &Path, sig: Signal) -> Result<i32, LifecycleError> {
    let pid = read_pid(pid_file)?;
    signal::kill(Pid::from_raw(pid), sig)
        .map_err(|source| LifecycleError::SignalFailed { pid, source })?;
    Ok(pid)
}

/// Poll until the process is gone. Returns `false` on timeout.
pub async fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if signal::kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Write startup marker to log file (appends to existing log)
pub fn write_startup_marker(log_file: &Path) -> Result<(), LifecycleError> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Install the global subscriber: stderr, or the log file when one is set
pub fn setup_logging(
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_file) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let file_name = log_file
        .file_name()
        .ok_or_else(|| LifecycleError::InvalidLogFile(log_file.to_path_buf()))?;
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(Some(guard))
}

/// A configured supervisor that has not started its workers yet
pub struct Daemon {
    pid_file: Option<PidFile>,
    signals: SignalStreams,
    supervisor: DaemonSupervisor,
    triggers: mpsc::Sender<Trigger>,
    workers: usize,
}

impl Daemon {
    /// Sender for operator triggers, in addition to OS signals
    pub fn triggers(&self) -> mpsc::Sender<Trigger> {
        self.triggers.clone()
    }

    pub fn pid_file(&self) -> Option<&Path> {
        self.pid_file.as_ref().map(PidFile::path)
    }

    /// Run the supervisor until shutdown, then remove the pid file
    pub async fn run(self) -> Result<(), LifecycleError> {
        let start_time = Instant::now();
        let Daemon {
            pid_file,
            signals,
            supervisor,
            triggers,
            workers,
        } = self;

        let forwarder = signals.forward(triggers);

        info!(workers, "supervisor running");
        let result = supervisor.run().await;
        forwarder.abort();

        if let Some(pid_file) = pid_file {
            pid_file.release();
        }
        info!(
            uptime_ms = start_time.elapsed().as_millis() as u64,
            "supervisor shutdown complete"
        );
        result.map_err(LifecycleError::from)
    }
}

/// Install signal handlers, acquire the pid file and assemble the supervisor
pub fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    // Handlers go in first: the pid file is what `nodown reload` signals
    let signals = SignalStreams::install()?;
    let pid_file = config
        .pid_file
        .as_deref()
        .map(PidFile::acquire)
        .transpose()?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (triggers_tx, triggers_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

    let adapter = TracedProcessAdapter::new(ChildProcessAdapter::new(
        events_tx,
        config.retire_signal,
    ));
    let pool = PoolManager::new(
        adapter,
        config.command.clone(),
        config.pool.spawn_retry.clone(),
    );
    let supervisor = Supervisor::new(pool, events_rx, triggers_rx, config.pool.clone());

    info!(
        program = %config.command.program,
        workers = config.pool.size,
        pid_file = ?config.pid_file,
        "supervisor configured"
    );

    Ok(Daemon {
        pid_file,
        signals,
        supervisor,
        triggers: triggers_tx,
        workers: config.pool.size,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
