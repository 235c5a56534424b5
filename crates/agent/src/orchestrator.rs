// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle: startup ordering, the heartbeat loop, command fan-out,
//! graceful shutdown.
//!
//! Startup follows a fixed order: config validation, engine install
//! (best-effort), engine start (best-effort), health surface, registration
//! (best-effort), heartbeat and command loops, reconciler. A heartbeat
//! failure clears registration so the next tick re-registers; once the
//! liaison's reconnect budget is exhausted the agent keeps serving but stops
//! dialling.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::{AgentConfig, AgentError, Command};
use warden_wire::{CommandResultReport, HeartbeatRequest, RegisterRequest};

use crate::dispatcher::CommandDispatcher;
use crate::env;
use crate::health::HealthSurface;
use crate::installer::EngineInstaller;
use crate::liaison::{LiaisonSnapshot, Panel, PanelLiaison};
use crate::metrics::MetricsCollector;
use crate::reconciler::ConfigReconciler;
use crate::registration::Registration;
use crate::supervisor::EngineSupervisor;
use crate::AGENT_VERSION;

/// Depth of the command queue between the heartbeat and processor loops
const COMMAND_QUEUE_DEPTH: usize = 32;

pub struct AgentOrchestrator {
    config: AgentConfig,
    supervisor: Arc<EngineSupervisor>,
    panel: Arc<dyn Panel>,
    reconciler: Arc<ConfigReconciler>,
    dispatcher: Arc<CommandDispatcher>,
    collector: Arc<MetricsCollector>,
    installer: EngineInstaller,
    registration: Registration,
    shutdown: CancellationToken,
    restart_signal: CancellationToken,
}

impl AgentOrchestrator {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        config.validate().map_err(|e| AgentError::Config(e.to_string()))?;

        let shutdown = CancellationToken::new();
        let restart_signal = CancellationToken::new();
        let supervisor = EngineSupervisor::new(&config.engine, shutdown.clone());
        let panel: Arc<dyn Panel> =
            Arc::new(PanelLiaison::new(&config.panel, config.node.token.clone())?);
        let registration = Registration::new();
        let collector = MetricsCollector::new(supervisor.clone());
        let reconciler = ConfigReconciler::new(
            &config.reconcile,
            panel.clone(),
            supervisor.clone(),
            registration.clone(),
        );
        let dispatcher = CommandDispatcher::new(
            supervisor.clone(),
            reconciler.clone(),
            collector.clone(),
            restart_signal.clone(),
        );
        let installer = EngineInstaller::new(&config.engine);

        Ok(Self {
            config,
            supervisor,
            panel,
            reconciler,
            dispatcher,
            collector,
            installer,
            registration,
            shutdown,
            restart_signal,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the startup sequence and spawn the long-lived loops.
    pub async fn start(self) -> Result<RunningAgent, AgentError> {
        info!(node = %self.config.node.name, version = AGENT_VERSION, "agent starting");

        if let Err(e) = self.installer.ensure_installed(&self.shutdown).await {
            warn!(error = %e, "engine install failed; assuming external management");
        }

        if let Err(e) = self.supervisor.start(&self.shutdown).await {
            warn!(error = %e, "engine start failed at boot; panel commands may start it later");
        }

        let surface = HealthSurface::new(
            &self.config.health,
            self.supervisor.clone(),
            self.collector.clone(),
            self.registration.clone(),
            self.shutdown.clone(),
        );
        let (health_addr, health_handle) = surface.serve().await?;

        self.try_register(&self.shutdown).await;

        let this = Arc::new(self);
        let (command_tx, command_rx) = mpsc::channel::<Command>(COMMAND_QUEUE_DEPTH);

        let heartbeat_handle = {
            let this = Arc::clone(&this);
            tokio::spawn(async move { this.heartbeat_loop(command_tx).await })
        };
        let processor_handle = {
            let this = Arc::clone(&this);
            tokio::spawn(async move { this.command_loop(command_rx).await })
        };

        this.reconciler.start(&this.shutdown);

        info!("agent started");
        Ok(RunningAgent {
            orchestrator: this,
            health_addr,
            handles: vec![heartbeat_handle, processor_handle, health_handle],
        })
    }

    async fn try_register(&self, cancel: &CancellationToken) {
        let request = RegisterRequest {
            token: self.config.node.token.clone(),
            name: self.config.node.name.clone(),
            version: AGENT_VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        };
        match self.panel.register(request, cancel).await {
            Ok(response) if response.success => {
                info!(node_id = response.node_id, "registered with panel");
                self.registration.set(response.node_id);
            }
            Ok(response) => {
                warn!(message = %response.message, "panel rejected registration");
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "registration failed"),
        }
    }

    /// Heartbeat every `heartbeat_interval`; commands from each response are
    /// handed to the command loop in panel order. Any heartbeat failure
    /// clears registration so the next tick re-registers.
    async fn heartbeat_loop(self: Arc<Self>, command_tx: mpsc::Sender<Command>) {
        let mut ticker = tokio::time::interval(self.config.panel.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let Some(node_id) = self.registration.node_id() else {
                if !self.panel.should_reconnect() {
                    debug!("reconnect budget exhausted; not dialling the panel");
                    continue;
                }
                if self.panel.wait_for_reconnect(&self.shutdown).await.is_err() {
                    return;
                }
                self.try_register(&self.shutdown).await;
                continue;
            };

            let metrics = self.collector.collect();
            let request = HeartbeatRequest {
                node_id,
                token: self.config.node.token.clone(),
                metrics: metrics.into(),
            };
            match self.panel.heartbeat(request, &self.shutdown).await {
                Ok(response) if response.success => {
                    for envelope in response.commands {
                        if command_tx.send(envelope.into()).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(response) => {
                    warn!(message = %response.message, "heartbeat rejected; re-registering");
                    self.registration.clear();
                }
                Err(e) if e.is_cancelled() => return,
                Err(e) => {
                    warn!(error = %e, "heartbeat failed; re-registering on next tick");
                    self.registration.clear();
                }
            }
        }
    }

    /// Drain commands serially; each result is reported (best-effort) before
    /// the next command begins.
    async fn command_loop(self: Arc<Self>, mut command_rx: mpsc::Receiver<Command>) {
        loop {
            let command = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                command = command_rx.recv() => match command {
                    Some(command) => command,
                    None => return,
                },
            };
            let result = self.dispatcher.execute(command, &self.shutdown).await;
            let report = CommandResultReport::from(result);
            if let Err(e) = self.panel.report_result(report, &self.shutdown).await {
                warn!(error = %e, "failed to report command result");
            }
        }
    }
}

/// Handle to a started agent: health address plus the background tasks.
pub struct RunningAgent {
    orchestrator: Arc<AgentOrchestrator>,
    pub health_addr: SocketAddr,
    handles: Vec<JoinHandle<()>>,
}

impl RunningAgent {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.orchestrator.shutdown.clone()
    }

    pub fn registration(&self) -> Registration {
        self.orchestrator.registration.clone()
    }

    pub fn engine_status(&self) -> warden_core::EngineStatus {
        self.orchestrator.supervisor.status()
    }

    pub fn panel_snapshot(&self) -> LiaisonSnapshot {
        self.orchestrator.panel.snapshot()
    }

    /// Block until shutdown (or a scheduled restart), then drain background
    /// tasks within a bounded grace window.
    pub async fn wait(self) -> Result<(), AgentError> {
        tokio::select! {
            _ = self.orchestrator.shutdown.cancelled() => {}
            _ = self.orchestrator.restart_signal.cancelled() => {
                info!("agent restart scheduled; exiting after delay");
                tokio::time::sleep(env::restart_delay()).await;
            }
        }

        self.orchestrator.reconciler.stop().await;
        self.orchestrator.shutdown.cancel();

        let drain = async {
            for handle in self.handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(env::drain_timeout(), drain).await.is_err() {
            warn!("background tasks did not drain in time; abandoning them");
        }
        info!("agent stopped");
        Ok(())
    }
}
