// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration and heartbeat envelopes.

use serde::{Deserialize, Serialize};

use crate::command::CommandEnvelope;
use crate::metrics::NodeMetrics;

/// `POST /api/node/register`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub token: String,
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub node_id: i64,
    #[serde(default)]
    pub message: String,
}

/// `POST /api/node/heartbeat`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatRequest {
    pub node_id: i64,
    pub token: String,
    pub metrics: NodeMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Commands to execute, in panel order
    #[serde(default)]
    pub commands: Vec<CommandEnvelope>,
}
