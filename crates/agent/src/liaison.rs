// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panel liaison: HTTP client plus the reconnection state machine.
//!
//! Every outbound call updates the same `LiaisonState`, so
//! `should_reconnect` is the single decision point. Transport failures and
//! non-2xx statuses feed the backoff; a 2xx body with `success: false` is an
//! application-level rejection on a healthy transport and resets it.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::{AgentError, Clock, PanelSection, SystemClock};
use warden_wire::{
    config_path, CommandResultReport, ConfigResponse, HeartbeatRequest, HeartbeatResponse,
    RegisterRequest, RegisterResponse, ResultAck, COMMAND_RESULT_PATH, HEARTBEAT_PATH,
    NODE_TOKEN_HEADER, REGISTER_PATH,
};

/// Reconnection accounting. Pure state transitions, testable without time.
#[derive(Debug, Clone)]
pub struct LiaisonState {
    pub last_connected_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub current_backoff: Duration,
    initial: Duration,
    max: Duration,
    max_failures: u32,
}

impl LiaisonState {
    pub fn new(initial: Duration, max: Duration, max_failures: u32) -> Self {
        Self {
            last_connected_ms: None,
            consecutive_failures: 0,
            current_backoff: initial,
            initial,
            max,
            max_failures,
        }
    }

    /// A successful call resets the counter and the backoff.
    pub fn record_success(&mut self, now_ms: u64) {
        self.last_connected_ms = Some(now_ms);
        self.consecutive_failures = 0;
        self.current_backoff = self.initial;
    }

    /// Each failure doubles the backoff, capped at the configured maximum.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_backoff = std::cmp::min(self.current_backoff.saturating_mul(2), self.max);
    }

    pub fn should_reconnect(&self) -> bool {
        self.consecutive_failures < self.max_failures
    }
}

/// Read-only view of the liaison state for health reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiaisonSnapshot {
    pub last_connected_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub current_backoff: Duration,
}

/// Seam over the panel so loops and the dispatcher are testable with a stub.
#[async_trait]
pub trait Panel: Send + Sync {
    async fn register(
        &self,
        request: RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegisterResponse, AgentError>;

    async fn heartbeat(
        &self,
        request: HeartbeatRequest,
        cancel: &CancellationToken,
    ) -> Result<HeartbeatResponse, AgentError>;

    /// Fetch the authoritative engine config for this node.
    async fn fetch_config(
        &self,
        node_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AgentError>;

    /// Best-effort: callers log failures and continue.
    async fn report_result(
        &self,
        report: CommandResultReport,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError>;

    fn should_reconnect(&self) -> bool;

    /// Cancellable sleep for the current backoff duration.
    async fn wait_for_reconnect(&self, cancel: &CancellationToken) -> Result<(), AgentError>;

    fn snapshot(&self) -> LiaisonSnapshot;
}

/// HTTP client to the panel. All requests carry the shared-secret header and
/// the configured per-request timeout.
pub struct PanelLiaison {
    client: reqwest::Client,
    base_url: String,
    token: String,
    state: Mutex<LiaisonState>,
    clock: SystemClock,
}

impl PanelLiaison {
    pub fn new(panel: &PanelSection, token: String) -> Result<Self, AgentError> {
        let mut builder = reqwest::Client::builder()
            .timeout(panel.connect_timeout)
            .connect_timeout(panel.connect_timeout);
        if panel.tls_skip_verify {
            // bootstrap-only escape hatch; verification is on by default
            warn!("panel TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| AgentError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: panel.url.trim_end_matches('/').to_string(),
            token,
            state: Mutex::new(LiaisonState::new(
                panel.reconnect_interval_initial,
                panel.reconnect_interval_max,
                panel.max_consecutive_failures,
            )),
            clock: SystemClock,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run one HTTP exchange, folding its outcome into the liaison state.
    /// Transport errors and non-2xx responses count as failures; any 2xx
    /// resets the backoff.
    async fn exchange<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, AgentError> {
        let request = request.header(NODE_TOKEN_HEADER, &self.token);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            response = request.send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.state.lock().record_failure();
                return Err(AgentError::Transport(e.to_string()));
            }
        };
        let status = response.status();
        if !status.is_success() {
            self.state.lock().record_failure();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!(
                "panel returned {}: {}",
                status,
                body.trim()
            )));
        }
        let parsed = response.json::<T>().await;
        match parsed {
            Ok(value) => {
                self.state.lock().record_success(self.clock.epoch_ms());
                Ok(value)
            }
            Err(e) => {
                self.state.lock().record_failure();
                Err(AgentError::Transport(format!("malformed panel response: {}", e)))
            }
        }
    }
}

#[async_trait]
impl Panel for PanelLiaison {
    async fn register(
        &self,
        request: RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegisterResponse, AgentError> {
        debug!(name = %request.name, "registering with panel");
        self.exchange(self.client.post(self.url(REGISTER_PATH)).json(&request), cancel).await
    }

    async fn heartbeat(
        &self,
        request: HeartbeatRequest,
        cancel: &CancellationToken,
    ) -> Result<HeartbeatResponse, AgentError> {
        self.exchange(self.client.post(self.url(HEARTBEAT_PATH)).json(&request), cancel).await
    }

    async fn fetch_config(
        &self,
        node_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AgentError> {
        let response: ConfigResponse =
            self.exchange(self.client.get(self.url(&config_path(node_id))), cancel).await?;
        if !response.success {
            return Err(AgentError::Rejected(response.message));
        }
        Ok(response.config.into_bytes())
    }

    async fn report_result(
        &self,
        report: CommandResultReport,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let ack: ResultAck = self
            .exchange(self.client.post(self.url(COMMAND_RESULT_PATH)).json(&report), cancel)
            .await?;
        if !ack.success {
            return Err(AgentError::Rejected(ack.message));
        }
        Ok(())
    }

    fn should_reconnect(&self) -> bool {
        self.state.lock().should_reconnect()
    }

    async fn wait_for_reconnect(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let backoff = self.state.lock().current_backoff;
        debug!(backoff_ms = backoff.as_millis() as u64, "waiting before reconnect");
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep(backoff) => Ok(()),
        }
    }

    fn snapshot(&self) -> LiaisonSnapshot {
        let state = self.state.lock();
        LiaisonSnapshot {
            last_connected_ms: state.last_connected_ms,
            consecutive_failures: state.consecutive_failures,
            current_backoff: state.current_backoff,
        }
    }
}

#[cfg(test)]
#[path = "liaison_tests.rs"]
mod tests;
