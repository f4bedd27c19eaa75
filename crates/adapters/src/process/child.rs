// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process adapter

use super::protocol::{parse_line, WorkerLine};
use super::{ProcessAdapter, ProcessError, SpawnedProcess, WorkerCommand};
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use nodown_core::{ExitStatus, ProcessEvent, WorkerId};
use std::collections::HashMap;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

/// Environment variable carrying the worker id into the worker process
pub const WORKER_ID_ENV: &str = "NODOWN_WORKER_ID";

/// How long to wait for buffered stdout after a worker exits, so lines
/// written before the exit are delivered ahead of it
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Parse a retire signal name such as `SIGTERM`, `term` or `none`
pub fn parse_retire_signal(name: &str) -> Result<Option<Signal>, ProcessError> {
    let upper = name.trim().to_ascii_uppercase();
    if upper == "NONE" {
        return Ok(None);
    }
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&full)
        .map(Some)
        .map_err(|_| ProcessError::InvalidSignal(name.to_string()))
}

struct ChildHandle {
    pid: Option<u32>,
    /// Dropping the write end tells the worker to wind down
    stdin: Option<ChildStdin>,
}

/// Adapter that runs workers as child processes of the supervisor
#[derive(Clone)]
pub struct ChildProcessAdapter {
    events: mpsc::Sender<ProcessEvent>,
    retire_signal: Option<Signal>,
    children: Arc<Mutex<HashMap<WorkerId, ChildHandle>>>,
}

impl ChildProcessAdapter {
    pub fn new(events: mpsc::Sender<ProcessEvent>, retire_signal: Option<Signal>) -> Self {
        Self {
            events,
            retire_signal,
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pid_of(&self, id: WorkerId) -> Result<Option<u32>, ProcessError> {
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|child| child.pid)
            .ok_or(ProcessError::NotFound(id))
    }
}

#[async_trait]
impl ProcessAdapter for ChildProcessAdapter {
    async fn spawn(
        &self,
        id: WorkerId,
        command: &WorkerCommand,
    ) -> Result<SpawnedProcess, ProcessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(WORKER_ID_ENV, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(format!("{}: {}", command.program, e)))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, ChildHandle { pid, stdin });

        tokio::spawn(watch_child(
            id,
            child,
            stdout,
            self.events.clone(),
            Arc::clone(&self.children),
        ));

        Ok(SpawnedProcess { pid })
    }

    async fn retire(&self, id: WorkerId) -> Result<(), ProcessError> {
        let (pid, stdin) = {
            let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
            let child = children.get_mut(&id).ok_or(ProcessError::NotFound(id))?;
            (child.pid, child.stdin.take())
        };
        drop(stdin);

        match (self.retire_signal, pid) {
            (Some(sig), Some(pid)) => send_signal(id, pid, sig),
            _ => Ok(()),
        }
    }

    async fn kill(&self, id: WorkerId) -> Result<(), ProcessError> {
        match self.pid_of(id)? {
            Some(pid) => send_signal(id, pid, Signal::SIGKILL),
            None => Ok(()),
        }
    }
}

fn send_signal(id: WorkerId, pid: u32, sig: Signal) -> Result<(), ProcessError> {
    let raw = i32::try_from(pid).map_err(|_| ProcessError::SignalFailed {
        id,
        message: format!("pid {} out of range", pid),
    })?;

    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => Ok(()),
        // Already gone; the exit notification is on its way
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(ProcessError::SignalFailed {
            id,
            message: e.to_string(),
        }),
    }
}

/// Own the child until it exits, then report the exit
async fn watch_child(
    id: WorkerId,
    mut child: Child,
    stdout: Option<ChildStdout>,
    events: mpsc::Sender<ProcessEvent>,
    children: Arc<Mutex<HashMap<WorkerId, ChildHandle>>>,
) {
    let reader = stdout.map(|out| tokio::spawn(forward_output(id, out, events.clone())));

    let status = match child.wait().await {
        Ok(status) => exit_status(status),
        Err(e) => {
            tracing::error!(worker = %id, error = %e, "failed to wait for worker");
            ExitStatus::default()
        }
    };

    // Reaped: the pid may be reused from here on
    if let Some(handle) = children
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get_mut(&id)
    {
        handle.pid = None;
        handle.stdin = None;
    }

    if let Some(reader) = reader {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
            tracing::debug!(worker = %id, "stdout still open after exit");
        }
    }

    children
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&id);

    if events
        .send(ProcessEvent::Exited { id, status })
        .await
        .is_err()
    {
        tracing::debug!(worker = %id, "supervisor gone, dropping exit notification");
    }
}

async fn forward_output(id: WorkerId, stdout: ChildStdout, events: mpsc::Sender<ProcessEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(worker = %id, error = %e, "stopped reading worker output");
                break;
            }
        };

        let event = match parse_line(&line) {
            WorkerLine::Ready(address) => ProcessEvent::Ready {
                id,
                address: address.map(str::to_string),
            },
            WorkerLine::Control(message) => ProcessEvent::Message { id, message },
            WorkerLine::Output(text) => {
                println!("{}", text);
                continue;
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }
}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(test)]
#[path = "child_tests.rs"]
mod tests;
