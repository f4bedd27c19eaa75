// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests running nodown with shell workers

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(deprecated)]

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use predicates::prelude::*;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(20);

/// Worker that reports readiness, announces itself and runs until stdin closes
const WORKER: &str = r#"echo READY; echo "worker $NODOWN_WORKER_ID up"; while read -r _; do :; done"#;

struct Running {
    child: Child,
    lines: mpsc::Receiver<String>,
    pid_file: PathBuf,
    _temp: TempDir,
}

impl Running {
    fn start(workers: usize, script: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("nodown.pid");
        let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("nodown"))
            .arg("run")
            .arg("--workers")
            .arg(workers.to_string())
            .arg("--pid-file")
            .arg(&pid_file)
            .args(["--", "sh", "-c", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let stdout = child.stdout.take().unwrap();
        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self {
            child,
            lines,
            pid_file,
            _temp: temp,
        }
    }

    /// Wait until every expected line has been printed, in any order
    fn expect_lines(&self, expected: &[&str]) {
        let mut missing: Vec<&str> = expected.to_vec();
        let deadline = Instant::now() + WAIT;
        while !missing.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(left) {
                Ok(line) => missing.retain(|m| *m != line),
                Err(_) => panic!("timed out waiting for {missing:?}"),
            }
        }
    }

    fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn signal(&self, sig: Signal) {
        kill(Pid::from_raw(self.child.id() as i32), sig).unwrap();
    }

    fn wait(mut self) -> std::process::ExitStatus {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                return status;
            }
            if Instant::now() >= deadline {
                let _ = self.child.kill();
                panic!("supervisor did not exit");
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

#[test]
fn sighup_replaces_every_worker() {
    let running = Running::start(2, WORKER);
    running.expect_lines(&["worker 1 up", "worker 2 up"]);

    Command::cargo_bin("nodown")
        .unwrap()
        .arg("reload")
        .arg("--pid-file")
        .arg(running.pid_file())
        .assert()
        .success()
        .stdout(predicate::str::contains("Requested rolling restart"));
    running.expect_lines(&["worker 3 up", "worker 4 up"]);

    Command::cargo_bin("nodown")
        .unwrap()
        .arg("stop")
        .arg("--pid-file")
        .arg(running.pid_file())
        .arg("--wait")
        .assert()
        .success()
        .stdout(predicate::str::contains("Supervisor stopped"));

    let pid_file = running.pid_file().to_path_buf();
    assert!(running.wait().success());
    assert!(!pid_file.exists());
}

#[test]
fn worker_reload_request_restarts_pool() {
    let script = r#"echo READY; echo "worker $NODOWN_WORKER_ID up"; [ "$NODOWN_WORKER_ID" = 1 ] && echo RELOAD; while read -r _; do :; done"#;
    let running = Running::start(1, script);

    running.expect_lines(&["worker 1 up", "worker 2 up"]);

    running.signal(Signal::SIGTERM);
    assert!(running.wait().success());
}

#[test]
fn crashed_worker_is_respawned() {
    let script = r#"echo READY; echo "worker $NODOWN_WORKER_ID up"; [ "$NODOWN_WORKER_ID" = 2 ] && exit 3; while read -r _; do :; done"#;
    let running = Running::start(2, script);

    running.expect_lines(&["worker 1 up", "worker 2 up", "worker 3 up"]);

    running.signal(Signal::SIGINT);
    assert!(running.wait().success());
}

#[test]
fn second_supervisor_on_same_pid_file_is_refused() {
    let running = Running::start(1, WORKER);
    running.expect_lines(&["worker 1 up"]);

    Command::cargo_bin("nodown")
        .unwrap()
        .arg("run")
        .arg("--pid-file")
        .arg(running.pid_file())
        .args(["--", "sh", "-c", WORKER])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));

    running.signal(Signal::SIGTERM);
    assert!(running.wait().success());
}

#[test]
fn workers_that_never_start_stop_the_supervisor() {
    Command::cargo_bin("nodown")
        .unwrap()
        .args(["run", "--workers", "1", "--", "sh", "-c", "exit 1"])
        .timeout(WAIT)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("exited before becoming ready"));
}

#[test]
fn log_file_receives_marker_and_events() {
    let temp = TempDir::new().unwrap();
    let log_file = temp.path().join("logs/nodown.log");

    Command::cargo_bin("nodown")
        .unwrap()
        .args(["run", "--workers", "1", "--log-file"])
        .arg(&log_file)
        .args(["--", "sh", "-c", "exit 1"])
        .timeout(WAIT)
        .assert()
        .failure();

    let log = std::fs::read_to_string(&log_file).unwrap();
    assert!(log.starts_with("--- nodown: starting (pid: "));
    assert!(log.contains("worker exited before becoming ready"));
}
