// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node metrics snapshot shared between the collector, the health surface,
//! and the panel wire types.

use serde::{Deserialize, Serialize};

/// Point-in-time sample of host and engine health.
///
/// A metric the host cannot provide is reported as numeric zero rather than
/// omitted; the panel reads zero as "unknown/unavailable".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetricsSnapshot {
    /// Aggregate CPU usage in percent
    pub cpu_usage: f64,
    /// Used memory in percent of total
    pub memory_usage_pct: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    /// Used disk space in percent across mounted filesystems
    pub disk_usage: f64,
    /// Total bytes received since boot
    pub network_in: u64,
    /// Total bytes transmitted since boot
    pub network_out: u64,
    /// Established TCP connections
    pub connections: u64,
    pub engine_running: bool,
    pub engine_version: String,
    /// Host uptime in seconds
    pub uptime_secs: u64,
    /// Sample time, epoch milliseconds
    pub timestamp_ms: u64,
}
