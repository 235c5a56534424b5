// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local health/metrics HTTP surface.
//!
//! Five GET endpoints on `health.host:health.port`; anything else on those
//! paths answers 405. Readiness is the composed predicate: agent running,
//! registered with the panel, engine up.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use warden_core::{AgentError, HealthSection};

use crate::metrics::MetricsCollector;
use crate::registration::Registration;
use crate::supervisor::EngineSupervisor;
use crate::AGENT_VERSION;

#[derive(Clone)]
struct HealthState {
    supervisor: Arc<EngineSupervisor>,
    collector: Arc<MetricsCollector>,
    registration: Registration,
    shutdown: CancellationToken,
}

pub struct HealthSurface {
    host: String,
    port: u16,
    state: HealthState,
}

impl HealthSurface {
    pub fn new(
        section: &HealthSection,
        supervisor: Arc<EngineSupervisor>,
        collector: Arc<MetricsCollector>,
        registration: Registration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
            state: HealthState { supervisor, collector, registration, shutdown },
        }
    }

    /// Bind and serve until the shutdown token fires. Bind failure is fatal
    /// to startup.
    pub async fn serve(self) -> Result<(std::net::SocketAddr, JoinHandle<()>), AgentError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "health surface listening");
        let shutdown = self.state.shutdown.clone();
        let app = router(self.state);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
        });
        Ok((local, handle))
    }
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/xray/status", get(engine_status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn live() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Each readiness check: (name, passing).
fn readiness_checks(state: &HealthState) -> Vec<(&'static str, bool)> {
    vec![
        ("agent_running", !state.shutdown.is_cancelled()),
        ("registered", state.registration.is_registered()),
        ("engine_running", state.supervisor.status().running),
    ]
}

async fn ready(State(state): State<HealthState>) -> Response {
    let checks = readiness_checks(&state);
    let failing: Vec<&str> =
        checks.iter().filter(|(_, passing)| !passing).map(|(name, _)| *name).collect();
    if failing.is_empty() {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "failing": failing,
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response()
    }
}

async fn health(State(state): State<HealthState>) -> Response {
    let engine = state.supervisor.status();
    let metrics = state.collector.collect();
    let checks = readiness_checks(&state);
    let status = if engine.running { "ok" } else { "degraded" };
    let body = serde_json::json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "agent": {
            "version": AGENT_VERSION,
            "registered": state.registration.is_registered(),
            "node_id": state.registration.node_id(),
        },
        "engine": engine,
        "metrics": metrics,
        "checks": checks
            .iter()
            .map(|(name, passing)| (name.to_string(), serde_json::Value::Bool(*passing)))
            .collect::<serde_json::Map<_, _>>(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn engine_status(State(state): State<HealthState>) -> Response {
    let status = state.supervisor.status();
    let code = if status.running { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(status)).into_response()
}

async fn metrics(State(state): State<HealthState>) -> Json<warden_core::NodeMetricsSnapshot> {
    Json(state.collector.collect())
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
