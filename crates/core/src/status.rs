// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine status snapshots, recomputed on demand and never cached across calls.

use serde::{Deserialize, Serialize};

/// Point-in-time view of the managed engine process.
///
/// Invariants: `pid` and `started_at_ms` are present iff `running`;
/// `uptime_secs` is derived from `started_at_ms` at snapshot time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
}

impl EngineStatus {
    pub fn stopped(version: impl Into<String>) -> Self {
        Self { running: false, pid: None, version: version.into(), started_at_ms: None, uptime_secs: None }
    }

    pub fn running(version: impl Into<String>, pid: u32, started_at_ms: u64, now_ms: u64) -> Self {
        Self {
            running: true,
            pid: Some(pid),
            version: version.into(),
            started_at_ms: Some(started_at_ms),
            uptime_secs: Some(now_ms.saturating_sub(started_at_ms) / 1000),
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
