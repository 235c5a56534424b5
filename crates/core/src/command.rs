// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panel command taxonomy and execution results.

use serde::{Deserialize, Serialize};

/// Typed command kinds pulled from heartbeat responses.
///
/// Unknown kinds survive deserialization via the untagged catch-all so the
/// dispatcher can echo them back in a failure result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    XrayStart,
    XrayStop,
    XrayRestart,
    XrayStatus,
    ConfigSync,
    ConfigGet,
    ConfigBackup,
    SystemInfo,
    SystemMetrics,
    AgentRestart,
    #[serde(untagged)]
    Unknown(String),
}

impl CommandKind {
    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::XrayStart => "xray_start",
            CommandKind::XrayStop => "xray_stop",
            CommandKind::XrayRestart => "xray_restart",
            CommandKind::XrayStatus => "xray_status",
            CommandKind::ConfigSync => "config_sync",
            CommandKind::ConfigGet => "config_get",
            CommandKind::ConfigBackup => "config_backup",
            CommandKind::SystemInfo => "system_info",
            CommandKind::SystemMetrics => "system_metrics",
            CommandKind::AgentRestart => "agent_restart",
            CommandKind::Unknown(other) => other,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single command from the panel. `id` is opaque and echoed in the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: String,
    pub kind: CommandKind,
    /// Opaque payload bytes (JSON text for the commands that carry one)
    pub payload: String,
}

/// Outcome of one executed command. Exactly one result exists per command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub command_id: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn ok(command_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { command_id: command_id.into(), success: true, message: message.into(), data: None }
    }

    pub fn ok_with(
        command_id: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn err(command_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { command_id: command_id.into(), success: false, message: message.into(), data: None }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
