// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command pull and result reporting envelopes.

use serde::{Deserialize, Serialize};
use warden_core::{Command, CommandKind, CommandResult};

/// One command inside a heartbeat response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Opaque payload; empty when the command carries none
    #[serde(default)]
    pub payload: String,
}

impl From<CommandEnvelope> for Command {
    fn from(envelope: CommandEnvelope) -> Self {
        Command { id: envelope.id, kind: envelope.kind, payload: envelope.payload }
    }
}

/// `POST /api/node/command/result`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResultReport {
    pub command_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<CommandResult> for CommandResultReport {
    fn from(result: CommandResult) -> Self {
        Self {
            command_id: result.command_id,
            success: result.success,
            message: result.message,
            data: result.data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}
