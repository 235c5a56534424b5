// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent ⇄ Panel wire contract.
//!
//! Transport is HTTP/1.1 with JSON bodies; every request carries the shared
//! secret in an `X-Node-Token` header. Non-2xx responses are transport
//! failures and feed the reconnect backoff; `success: false` inside a 2xx
//! body is an application-level rejection on a healthy transport.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod command;
mod config;
mod metrics;
mod node;

pub use command::{CommandEnvelope, CommandResultReport, ResultAck};
pub use config::{ConfigEnvelope, ConfigResponse};
pub use metrics::NodeMetrics;
pub use node::{HeartbeatRequest, HeartbeatResponse, RegisterRequest, RegisterResponse};

/// Header carrying the shared node secret
pub const NODE_TOKEN_HEADER: &str = "X-Node-Token";

/// Panel endpoint paths
pub const REGISTER_PATH: &str = "/api/node/register";
pub const HEARTBEAT_PATH: &str = "/api/node/heartbeat";
pub const COMMAND_RESULT_PATH: &str = "/api/node/command/result";

/// Path of the per-node config endpoint
pub fn config_path(node_id: i64) -> String {
    format!("/api/node/{}/config", node_id)
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
