// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version-gated config reconciliation.
//!
//! A configuration's authoritative identity is the panel's `version` string:
//! the reconciler compares versions and either applies or skips, never
//! diffing semantic content. Sync iterations never overlap; an extra
//! triggered run coalesces into at most one queued iteration.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::{AgentError, Clock, ReconcileSection, SystemClock};
use warden_wire::ConfigEnvelope;

use crate::liaison::Panel;
use crate::registration::Registration;
use crate::supervisor::EngineSupervisor;

/// Mutable reconciliation state. `current_version` changes only after a
/// successful apply.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationState {
    pub last_sync_ms: Option<u64>,
    pub last_error: Option<String>,
    pub current_version: String,
    pub running: bool,
}

pub struct ConfigReconciler {
    panel: Arc<dyn Panel>,
    supervisor: Arc<EngineSupervisor>,
    registration: Registration,
    sync_interval: Duration,
    max_retries: u32,
    retry_interval: Duration,
    validate_before_apply: bool,
    backup_before_apply: bool,
    state: Mutex<ReconciliationState>,
    /// Prevents overlapping sync iterations
    sync_lock: tokio::sync::Mutex<()>,
    trigger: Notify,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    clock: SystemClock,
}

impl ConfigReconciler {
    pub fn new(
        section: &ReconcileSection,
        panel: Arc<dyn Panel>,
        supervisor: Arc<EngineSupervisor>,
        registration: Registration,
    ) -> Arc<Self> {
        Arc::new(Self {
            panel,
            supervisor,
            registration,
            sync_interval: section.sync_interval,
            max_retries: section.max_retries,
            retry_interval: section.retry_interval,
            validate_before_apply: section.validate_before_apply,
            backup_before_apply: section.backup_before_apply,
            state: Mutex::new(ReconciliationState::default()),
            sync_lock: tokio::sync::Mutex::new(()),
            trigger: Notify::new(),
            task: Mutex::new(None),
            clock: SystemClock,
        })
    }

    pub fn snapshot(&self) -> ReconciliationState {
        self.state.lock().clone()
    }

    /// Start the periodic sync task. Idempotent on repeated calls.
    pub fn start(self: &Arc<Self>, shutdown: &CancellationToken) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let stop = shutdown.child_token();
        let reconciler = Arc::clone(self);
        let loop_token = stop.clone();
        let handle = tokio::spawn(async move {
            reconciler.run_loop(loop_token).await;
        });
        self.state.lock().running = true;
        *task = Some((stop, handle));
        info!(interval_secs = self.sync_interval.as_secs(), "config reconciler started");
    }

    /// Cancel the periodic task and wait for the in-flight iteration.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some((stop, handle)) = task {
            stop.cancel();
            let _ = handle.await;
        }
        self.state.lock().running = false;
        debug!("config reconciler stopped");
    }

    /// Non-blocking request for an additional sync on the running loop.
    pub fn trigger_sync(&self) {
        self.trigger.notify_one();
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.sync_interval) => {}
                _ = self.trigger.notified() => {}
            }
            match self.sync(&cancel).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return,
                Err(e) => debug!(error = %e, "reconciliation tick failed"),
            }
        }
    }

    /// One reconciliation step: fetch, version-gate, apply.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let _iteration = self.sync_lock.lock().await;
        let result = self.sync_inner(cancel).await;
        let mut state = self.state.lock();
        match &result {
            Ok(()) => {
                state.last_sync_ms = Some(self.clock.epoch_ms());
                state.last_error = None;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                state.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn sync_inner(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let node_id = self.registration.node_id().ok_or(AgentError::NotRegistered)?;
        let bytes = self.panel.fetch_config(node_id, cancel).await?;

        let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::InvalidConfig(format!("unparseable config body: {}", e)))?;

        let current = self.state.lock().current_version.clone();
        if envelope.version == current {
            debug!(version = %current, "config already at panel version; skipping");
            return Ok(());
        }

        info!(
            from = %current,
            to = %envelope.version,
            timestamp = envelope.timestamp,
            "applying config update"
        );
        self.apply(&bytes, cancel).await?;
        self.state.lock().current_version = envelope.version;
        Ok(())
    }

    /// Apply policy: optional backup (best-effort), optional validation
    /// (aborting), then the supervisor's update pipeline. Any failure leaves
    /// `current_version` unchanged so the next sync retries the same
    /// mismatch.
    async fn apply(&self, bytes: &[u8], cancel: &CancellationToken) -> Result<(), AgentError> {
        if self.backup_before_apply {
            if let Err(e) = self.supervisor.backup_config() {
                warn!(error = %e, "pre-apply backup failed; continuing");
            }
        }
        if self.validate_before_apply {
            self.supervisor.validate_config(bytes, cancel).await?;
        }
        self.supervisor.update_config(bytes, cancel).await
    }

    /// Invoke `sync` up to `max_retries + 1` times, `retry_interval` apart,
    /// returning the last error on exhaustion.
    pub async fn sync_with_retry(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let mut last = None;
        for attempt in 0..=self.max_retries {
            match self.sync(cancel).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "sync attempt failed");
                    last = Some(e);
                }
            }
            if attempt < self.max_retries {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    _ = tokio::time::sleep(self.retry_interval) => {}
                }
            }
        }
        Err(last.unwrap_or(AgentError::Cancelled))
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
