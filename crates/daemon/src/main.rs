// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nodown - zero-downtime process supervisor
//!
//! Keeps a fixed pool of worker processes alive and replaces them one at a
//! time on SIGHUP.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use nix::sys::signal::Signal;
use nodown_daemon::{lifecycle, Config, Overrides};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nodown", version, about = "Zero-downtime process supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor in the foreground
    Run(RunArgs),
    /// Ask a running supervisor for a rolling restart (SIGHUP)
    Reload(PidArgs),
    /// Ask a running supervisor to shut down (SIGTERM)
    Stop(StopArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of workers [default: available processing units]
    #[arg(short = 'n', long)]
    workers: Option<usize>,

    /// Working directory for workers
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Signal sent to retiring workers, or "none" [default: SIGTERM]
    #[arg(long)]
    retire_signal: Option<String>,

    /// How long a new worker may take to report READY ("0s" disables)
    #[arg(long, value_parser = humantime::parse_duration)]
    ready_timeout: Option<Duration>,

    /// How long a retiring worker may take to exit ("0s" disables)
    #[arg(long, value_parser = humantime::parse_duration)]
    retire_timeout: Option<Duration>,

    /// Write and lock the supervisor pid here
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Extra worker environment, KEY=VALUE
    #[arg(short, long = "env", value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// Worker command and arguments
    #[arg(last = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn into_parts(self) -> (Option<PathBuf>, Overrides) {
        let overrides = Overrides {
            command: self.command,
            cwd: self.cwd,
            workers: self.workers,
            retire_signal: self.retire_signal,
            ready_timeout: self.ready_timeout,
            retire_timeout: self.retire_timeout,
            pid_file: self.pid_file,
            log_file: self.log_file,
            env: self.env,
        };
        (self.config, overrides)
    }
}

#[derive(Args)]
struct PidArgs {
    /// Pid file of the running supervisor
    #[arg(long)]
    pid_file: PathBuf,
}

#[derive(Args)]
struct StopArgs {
    #[command(flatten)]
    pid: PidArgs,

    /// Wait for the supervisor to exit
    #[arg(long)]
    wait: bool,

    /// Give up waiting after this long
    #[arg(long, value_parser = humantime::parse_duration, default_value = "90s")]
    timeout: Duration,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Reload(args) => {
            let pid = lifecycle::signal_supervisor(&args.pid_file, Signal::SIGHUP)?;
            println!("Requested rolling restart (pid {pid})");
            Ok(())
        }
        Commands::Stop(args) => stop(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let (config_path, overrides) = args.into_parts();
    let config = Config::load(config_path.as_deref(), overrides)?;

    // Marker goes in before tracing starts writing to the same file
    if let Some(log_file) = &config.log_file {
        lifecycle::write_startup_marker(log_file)?;
    }
    let _log_guard = lifecycle::setup_logging(config.log_file.as_deref())?;

    info!(pid = std::process::id(), "starting nodown");

    let daemon = match lifecycle::startup(&config) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "failed to start supervisor");
            return Err(e.into());
        }
    };

    if let Err(e) = daemon.run().await {
        error!(error = %e, "supervisor stopped with an error");
        return Err(e.into());
    }
    Ok(())
}

async fn stop(args: StopArgs) -> Result<()> {
    let pid = lifecycle::signal_supervisor(&args.pid.pid_file, Signal::SIGTERM)?;
    println!("Requested shutdown (pid {pid})");

    if args.wait {
        if !lifecycle::wait_for_exit(pid, args.timeout).await {
            bail!(
                "supervisor (pid {pid}) still running after {}",
                humantime::format_duration(args.timeout)
            );
        }
        println!("Supervisor stopped");
    }
    Ok(())
}
