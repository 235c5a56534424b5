// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! warden-agent: per-host node agent for the panel control plane.
//!
//! Supervises the local packet-forwarding engine, reports heartbeats and
//! metrics to the panel, executes panel commands, and reconciles the local
//! engine configuration against the panel's authoritative version.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dispatcher;
pub mod env;
pub mod health;
pub mod installer;
pub mod liaison;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod reconciler;
pub mod registration;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::CommandDispatcher;
pub use health::HealthSurface;
pub use installer::EngineInstaller;
pub use liaison::{LiaisonSnapshot, LiaisonState, Panel, PanelLiaison};
pub use metrics::MetricsCollector;
pub use orchestrator::{AgentOrchestrator, RunningAgent};
pub use reconciler::{ConfigReconciler, ReconciliationState};
pub use registration::Registration;
pub use supervisor::{EnginePhase, EngineSupervisor};

/// Agent version reported to the panel and on the health surface
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
