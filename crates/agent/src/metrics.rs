// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand host metrics sampling.
//!
//! Holds a persistent `sysinfo::System` so successive CPU refreshes have a
//! time base to diff against. A metric the host cannot provide is reported
//! as zero, never omitted; the panel reads zero as "unavailable".

use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::{Disks, Networks, System};

use warden_core::{Clock, NodeMetricsSnapshot, SystemClock};

use crate::supervisor::EngineSupervisor;

pub struct MetricsCollector {
    system: Mutex<System>,
    supervisor: Arc<EngineSupervisor>,
    clock: SystemClock,
}

impl MetricsCollector {
    pub fn new(supervisor: Arc<EngineSupervisor>) -> Arc<Self> {
        Arc::new(Self { system: Mutex::new(System::new()), supervisor, clock: SystemClock })
    }

    /// Take a fresh snapshot. The first call after startup may report CPU as
    /// zero until a second refresh establishes a delta.
    pub fn collect(&self) -> NodeMetricsSnapshot {
        let (cpu_usage, memory_total, memory_used) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            (f64::from(system.global_cpu_usage()), system.total_memory(), system.used_memory())
        };
        let memory_usage_pct = if memory_total > 0 {
            memory_used as f64 / memory_total as f64 * 100.0
        } else {
            0.0
        };

        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
        let disk_usage = if disk_total > 0 {
            (disk_total - disk_available) as f64 / disk_total as f64 * 100.0
        } else {
            0.0
        };

        let networks = Networks::new_with_refreshed_list();
        let (network_in, network_out) = networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });

        let status = self.supervisor.status();

        NodeMetricsSnapshot {
            cpu_usage,
            memory_usage_pct,
            memory_total,
            memory_used,
            disk_usage,
            network_in,
            network_out,
            connections: established_connections(),
            engine_running: status.running,
            engine_version: status.version,
            uptime_secs: System::uptime(),
            timestamp_ms: self.clock.epoch_ms(),
        }
    }
}

/// Count established TCP connections from procfs; zero where unsupported.
#[cfg(target_os = "linux")]
fn established_connections() -> u64 {
    const ESTABLISHED: &str = "01";
    let mut count = 0u64;
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        let Ok(contents) = std::fs::read_to_string(table) else { continue };
        count += contents
            .lines()
            .skip(1)
            .filter(|line| line.split_whitespace().nth(3) == Some(ESTABLISHED))
            .count() as u64;
    }
    count
}

#[cfg(not(target_os = "linux"))]
fn established_connections() -> u64 {
    0
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
