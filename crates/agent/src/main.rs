// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardend: the node agent daemon.
//!
//! Takes an optional config file path as its single argument, falling back
//! to `AGENT_CONFIG` and then `/etc/warden/config.yaml`. Runs until SIGTERM
//! or SIGINT, or until the panel schedules an agent restart (the process
//! exits and the service manager brings it back).

use std::path::PathBuf;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::info;

use warden_agent::{env, logging, AgentOrchestrator};
use warden_core::AgentConfig;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("wardend: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(env::config_path);
    let config = AgentConfig::load(&config_path)?;
    let _log_guard = logging::init_logging(&config.log)?;
    info!(config = %config_path.display(), "configuration loaded");

    let orchestrator = AgentOrchestrator::new(config)?;
    spawn_signal_handler(orchestrator.shutdown_token())?;

    let running = orchestrator.start().await?;
    running.wait().await?;
    Ok(())
}

#[cfg(unix)]
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<(), std::io::Error> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received; shutting down"),
            _ = sigint.recv() => info!("SIGINT received; shutting down"),
        }
        shutdown.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<(), std::io::Error> {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });
    Ok(())
}
