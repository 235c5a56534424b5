// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panel-facing metrics shape.

use serde::{Deserialize, Serialize};
use warden_core::NodeMetricsSnapshot;

/// Metrics as the panel expects them inside a heartbeat.
///
/// Numeric zero represents "not available" throughout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disk_usage: f64,
    pub network_in: u64,
    pub network_out: u64,
    pub connections: u64,
    pub xray_running: bool,
    pub xray_version: String,
    pub uptime: u64,
    pub timestamp: u64,
}

impl From<NodeMetricsSnapshot> for NodeMetrics {
    fn from(s: NodeMetricsSnapshot) -> Self {
        Self {
            cpu_usage: s.cpu_usage,
            memory_usage: s.memory_usage_pct,
            memory_total: s.memory_total,
            memory_used: s.memory_used,
            disk_usage: s.disk_usage,
            network_in: s.network_in,
            network_out: s.network_out,
            connections: s.connections,
            xray_running: s.engine_running,
            xray_version: s.engine_version,
            uptime: s.uptime_secs,
            timestamp: s.timestamp_ms,
        }
    }
}
