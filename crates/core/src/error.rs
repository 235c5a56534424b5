// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent error taxonomy.
//!
//! Loops (heartbeat, reconciler, process monitor) recover locally: they log,
//! update their state, and continue. Single-shot operations surface these
//! errors to the caller. `Cancelled` is always distinguishable and is never
//! counted as a fault by backoff accounting.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Startup configuration validation failed; the only fatal runtime error
    #[error("invalid agent configuration: {0}")]
    Config(String),

    /// Operation required a node_id but none is held
    #[error("not registered with the panel")]
    NotRegistered,

    /// Panel answered with `success: false`; transport was healthy
    #[error("panel rejected the request: {0}")]
    Rejected(String),

    /// Network- or HTTP-layer failure; feeds the reconnect backoff
    #[error("panel transport failure: {0}")]
    Transport(String),

    /// Engine `-test` mode rejected the configuration bytes
    #[error("engine rejected config: {0}")]
    InvalidConfig(String),

    #[error("engine is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("engine is already stopped")]
    AlreadyStopped,

    /// OS-level engine start failure
    #[error("failed to launch engine: {0}")]
    LaunchFailed(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation aborted by cancellation; never a fault
    #[error("operation cancelled")]
    Cancelled,

    /// The liaison failure counter hit its cap; dialling stops until reset
    #[error("reconnect budget exhausted after {failures} consecutive failures")]
    ReconnectExhausted { failures: u32 },
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, AgentError::Transport(_))
    }

    /// Map an io error, surfacing missing files as `NotFound`
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            AgentError::NotFound(path.to_path_buf())
        } else {
            AgentError::Io(err)
        }
    }
}
