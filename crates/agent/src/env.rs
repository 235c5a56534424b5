// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent crate.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve the agent config file path: AGENT_CONFIG > /etc/warden/config.yaml
pub fn config_path() -> PathBuf {
    std::env::var("AGENT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/warden/config.yaml"))
}

/// Shutdown drain timeout (default 5s, configurable via `AGENT_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("AGENT_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Delay before the process exits on an `agent_restart` command, so the
/// command result reaches the panel first (default 1s).
pub fn restart_delay() -> Duration {
    std::env::var("AGENT_RESTART_DELAY_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}
