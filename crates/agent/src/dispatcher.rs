// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panel command execution.
//!
//! Commands run serially in the order the panel listed them; each produces
//! exactly one result carrying the original command id. Execution never
//! touches the supervisor concurrently with another command.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::{AgentError, Command, CommandKind, CommandResult};

use crate::metrics::MetricsCollector;
use crate::reconciler::ConfigReconciler;
use crate::supervisor::EngineSupervisor;

pub struct CommandDispatcher {
    supervisor: Arc<EngineSupervisor>,
    reconciler: Arc<ConfigReconciler>,
    collector: Arc<MetricsCollector>,
    /// Fired by `agent_restart`; the orchestrator schedules the process
    /// restart once the command result is on its way to the panel.
    restart_signal: CancellationToken,
}

impl CommandDispatcher {
    pub fn new(
        supervisor: Arc<EngineSupervisor>,
        reconciler: Arc<ConfigReconciler>,
        collector: Arc<MetricsCollector>,
        restart_signal: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self { supervisor, reconciler, collector, restart_signal })
    }

    /// Execute one command and produce its result, timing the run.
    pub async fn execute(&self, command: Command, cancel: &CancellationToken) -> CommandResult {
        let started = Instant::now();
        let kind = command.kind.clone();
        let id = command.id.clone();
        let result = match self.action(command, cancel).await {
            Ok(result) => result,
            Err(e) => CommandResult::err(id, e.to_string()),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            command_id = %result.command_id,
            kind = %kind,
            success = result.success,
            duration_ms,
            "command executed"
        );
        result
    }

    async fn action(
        &self,
        command: Command,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, AgentError> {
        let Command { id, kind, payload } = command;
        match kind {
            CommandKind::XrayStart => {
                let status = self.supervisor.start(cancel).await?;
                Ok(CommandResult::ok_with(id, "engine started", to_value(&status)))
            }
            CommandKind::XrayStop => {
                self.supervisor.stop(cancel).await?;
                Ok(CommandResult::ok(id, "engine stopped"))
            }
            CommandKind::XrayRestart => {
                let status = self.supervisor.restart(cancel).await?;
                Ok(CommandResult::ok_with(id, "engine restarted", to_value(&status)))
            }
            CommandKind::XrayStatus => {
                Ok(CommandResult::ok_with(id, "engine status", to_value(&self.supervisor.status())))
            }
            CommandKind::ConfigSync => {
                if payload.trim().is_empty() {
                    // no payload: pull the panel's version through the
                    // reconciler so version bookkeeping stays coherent
                    self.reconciler.sync(cancel).await?;
                    Ok(CommandResult::ok(id, "config synced from panel"))
                } else {
                    self.supervisor.update_config(payload.as_bytes(), cancel).await?;
                    Ok(CommandResult::ok(id, "config applied"))
                }
            }
            CommandKind::ConfigGet => {
                let bytes = self.supervisor.read_config().await?;
                let config = String::from_utf8_lossy(&bytes).into_owned();
                Ok(CommandResult::ok_with(id, "current config", serde_json::Value::String(config)))
            }
            CommandKind::ConfigBackup => {
                let path = self.supervisor.backup_config()?;
                let backup_path = path.map(|p| p.display().to_string()).unwrap_or_default();
                Ok(CommandResult::ok_with(
                    id,
                    "config backed up",
                    serde_json::json!({ "backup_path": backup_path }),
                ))
            }
            CommandKind::SystemInfo | CommandKind::SystemMetrics => {
                Ok(CommandResult::ok_with(id, "node metrics", to_value(&self.collector.collect())))
            }
            CommandKind::AgentRestart => {
                warn!("panel requested agent restart");
                self.restart_signal.cancel();
                Ok(CommandResult::ok(id, "agent restart scheduled"))
            }
            CommandKind::Unknown(other) => {
                Ok(CommandResult::err(id, format!("unknown command type: {}", other)))
            }
        }
    }
}

/// Serialize command data; these shapes have no fallible cases.
fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
