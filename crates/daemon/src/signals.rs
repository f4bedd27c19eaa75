// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS signals as supervisor triggers

use nodown_core::{RestartReason, Trigger};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Installed handlers for SIGHUP, SIGTERM and SIGINT.
///
/// Signals delivered after `install` are buffered until `forward` runs.
pub struct SignalStreams {
    hangup: Signal,
    terminate: Signal,
    interrupt: Signal,
}

impl SignalStreams {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Forward SIGHUP as a rolling restart and SIGTERM/SIGINT as shutdown
    pub fn forward(self, triggers: mpsc::Sender<Trigger>) -> JoinHandle<()> {
        let Self {
            mut hangup,
            mut terminate,
            mut interrupt,
        } = self;

        tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    Some(()) = hangup.recv() => {
                        info!("received SIGHUP, requesting rolling restart");
                        Trigger::Restart(RestartReason::Signal)
                    }
                    Some(()) = terminate.recv() => {
                        info!("received SIGTERM, shutting down");
                        Trigger::Shutdown
                    }
                    Some(()) = interrupt.recv() => {
                        info!("received SIGINT, shutting down");
                        Trigger::Shutdown
                    }
                    else => break,
                };

                if triggers.send(trigger).await.is_err() {
                    break;
                }
            }
        })
    }
}
