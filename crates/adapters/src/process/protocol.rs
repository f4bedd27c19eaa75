// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line protocol spoken by workers on stdout
//!
//! - `READY` or `READY <address>`: startup finished
//! - `RELOAD`: request a rolling restart of the pool
//!
//! Every other line is application output.

use nodown_core::ControlMessage;

/// A classified stdout line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLine<'a> {
    Ready(Option<&'a str>),
    Control(ControlMessage),
    Output(&'a str),
}

pub fn parse_line(line: &str) -> WorkerLine<'_> {
    let trimmed = line.trim_end();
    match trimmed.split_once(' ') {
        None if trimmed == "READY" => WorkerLine::Ready(None),
        None if trimmed == "RELOAD" => WorkerLine::Control(ControlMessage::Reload),
        Some(("READY", address)) => {
            let address = address.trim();
            WorkerLine::Ready((!address.is_empty()).then_some(address))
        }
        _ => WorkerLine::Output(line),
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
