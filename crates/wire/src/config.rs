// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative engine configuration envelopes.

use serde::{Deserialize, Serialize};

/// `GET /api/node/<node_id>/config`
///
/// `config` is the raw engine JSON as a string; the agent treats it as opaque
/// beyond the version gate and the engine's own `-test` validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigResponse {
    pub success: bool,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub message: String,
}

/// Minimal envelope the reconciler reads out of the config body.
///
/// A configuration's authoritative identity is the panel's `version` string;
/// the agent compares versions and either applies or skips, never diffing
/// semantic content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigEnvelope {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: i64,
}
