// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine process supervision.
//!
//! The supervisor is the sole owner of the engine child process and the only
//! writer of the live engine config file. Lifecycle operations serialize on
//! an internal async mutex; `status()` is a read and may observe any legal
//! interleaving. A crashed engine is restarted with a linear backoff until
//! the crash budget is exhausted, after which only an explicit start revives
//! it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_core::{AgentError, Clock, EngineSection, EngineStatus, SystemClock};

/// Grace window between SIGTERM and SIGKILL on stop
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Settle delay between the stop and start halves of a restart
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Poll interval while waiting for the child to honor SIGTERM
const STOP_POLL: Duration = Duration::from_millis(50);

/// Supervisor lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Exhausted,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnginePhase::Stopped => "stopped",
            EnginePhase::Starting => "starting",
            EnginePhase::Running => "running",
            EnginePhase::Stopping => "stopping",
            EnginePhase::Crashed => "crashed",
            EnginePhase::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct SupervisorState {
    phase: EnginePhase,
    pid: Option<u32>,
    started_at_ms: Option<u64>,
    crash_count: u32,
    /// Incremented on every explicit start; stale monitors check it before
    /// touching state
    generation: u64,
    /// Whether the supervisor currently wants the engine up
    intent_running: bool,
    /// First line of `engine version`, cached after the first probe
    version: String,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            phase: EnginePhase::Stopped,
            pid: None,
            started_at_ms: None,
            crash_count: 0,
            generation: 0,
            intent_running: false,
            version: String::new(),
        }
    }
}

/// Owns the engine child process: lifecycle, status, config file management.
pub struct EngineSupervisor {
    binary_path: PathBuf,
    config_path: PathBuf,
    backup_dir: PathBuf,
    max_restarts: u32,
    backup_retention: usize,
    state: Mutex<SupervisorState>,
    /// Serializes start/stop/restart/update; never held across `status()`
    ops: tokio::sync::Mutex<()>,
    /// Agent root token; crash-recovery waits observe it
    shutdown: CancellationToken,
}

impl EngineSupervisor {
    pub fn new(engine: &EngineSection, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            binary_path: engine.binary_path.clone(),
            config_path: engine.config_path.clone(),
            backup_dir: engine.backup_dir.clone(),
            max_restarts: engine.max_restarts,
            backup_retention: engine.backup_retention,
            state: Mutex::new(SupervisorState::new()),
            ops: tokio::sync::Mutex::new(()),
            shutdown,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Launch the engine. Fails `AlreadyRunning` if a prior start has not
    /// terminated, `InvalidConfig` if the on-disk config is rejected by the
    /// engine's `-test` mode, `LaunchFailed` on OS-level spawn errors.
    pub async fn start(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<EngineStatus, AgentError> {
        let _ops = self.ops.lock().await;
        self.start_locked(cancel).await?;
        Ok(self.status())
    }

    /// Interrupt the engine, wait a bounded grace window, then force-kill.
    /// Idempotent: success when already stopped.
    pub async fn stop(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), AgentError> {
        let _ops = self.ops.lock().await;
        self.stop_locked(cancel).await
    }

    /// Stop then start, with a short settle delay between.
    pub async fn restart(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<EngineStatus, AgentError> {
        let _ops = self.ops.lock().await;
        self.stop_locked(cancel).await?;
        tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            _ = tokio::time::sleep(SETTLE_DELAY) => {}
        }
        self.start_locked(cancel).await?;
        Ok(self.status())
    }

    /// Non-blocking status snapshot. Liveness of the recorded pid is probed
    /// with a null signal; a rejected probe reports the engine as stopped.
    pub fn status(&self) -> EngineStatus {
        let (pid, started_at_ms, version) = {
            let state = self.state.lock();
            (state.pid, state.started_at_ms, state.version.clone())
        };
        match (pid, started_at_ms) {
            (Some(pid), Some(started)) if pid_alive(pid) => {
                EngineStatus::running(version, pid, started, SystemClock.epoch_ms())
            }
            _ => EngineStatus::stopped(version),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.state.lock().phase
    }

    pub fn crash_count(&self) -> u32 {
        self.state.lock().crash_count
    }

    /// First line of `engine version`, probed once and cached.
    pub async fn engine_version(&self) -> String {
        if let Some(version) = {
            let state = self.state.lock();
            (!state.version.is_empty()).then(|| state.version.clone())
        } {
            return version;
        }
        let mut command = Command::new(&self.binary_path);
        command.arg("version").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
        command.kill_on_drop(true);
        let version = match command.output().await {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            Ok(_) | Err(_) => String::new(),
        };
        if !version.is_empty() {
            self.state.lock().version = version.clone();
        }
        version
    }

    async fn start_locked(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), AgentError> {
        if let Some(pid) = self.live_pid() {
            return Err(AgentError::AlreadyRunning { pid });
        }
        self.state.lock().phase = EnginePhase::Starting;

        if let Err(e) = self.run_engine_test(&self.config_path, cancel).await {
            self.state.lock().phase = EnginePhase::Stopped;
            return Err(e);
        }

        let (child, pid) = match self.spawn_engine() {
            Ok(spawned) => spawned,
            Err(e) => {
                self.state.lock().phase = EnginePhase::Stopped;
                return Err(e);
            }
        };

        let generation = {
            let mut state = self.state.lock();
            state.phase = EnginePhase::Running;
            state.pid = Some(pid);
            state.started_at_ms = Some(SystemClock.epoch_ms());
            state.intent_running = true;
            state.crash_count = 0;
            state.generation += 1;
            state.generation
        };
        info!(pid, generation, "engine started");

        self.engine_version().await;

        let supervisor = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            supervisor.monitor(child, generation, shutdown).await;
        });
        Ok(())
    }

    async fn stop_locked(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let pid = {
            let mut state = self.state.lock();
            state.intent_running = false;
            match state.pid.filter(|&p| pid_alive(p)) {
                Some(pid) => {
                    state.phase = EnginePhase::Stopping;
                    pid
                }
                None => {
                    state.pid = None;
                    state.started_at_ms = None;
                    state.phase = EnginePhase::Stopped;
                    return Ok(());
                }
            }
        };

        debug!(pid, "sending SIGTERM to engine");
        send_signal(pid, EngineSignal::Term);

        let deadline = Instant::now() + STOP_GRACE;
        while pid_alive(pid) && Instant::now() < deadline && !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(STOP_POLL) => {}
            }
        }
        if pid_alive(pid) {
            warn!(pid, "engine ignored SIGTERM; force-killing");
            send_signal(pid, EngineSignal::Kill);
            tokio::time::sleep(STOP_POLL).await;
        }

        let mut state = self.state.lock();
        state.pid = None;
        state.started_at_ms = None;
        state.phase = EnginePhase::Stopped;
        info!(pid, "engine stopped");
        Ok(())
    }

    fn live_pid(&self) -> Option<u32> {
        self.state.lock().pid.filter(|&pid| pid_alive(pid))
    }

    fn spawn_engine(&self) -> Result<(Child, u32), AgentError> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("run")
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = command.spawn().map_err(|e| AgentError::LaunchFailed(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| AgentError::LaunchFailed("engine exited before pid was read".into()))?;
        Ok((child, pid))
    }

    // ── Process monitor (one per successful explicit start) ───────────

    async fn monitor(self: Arc<Self>, mut child: Child, generation: u64, shutdown: CancellationToken) {
        loop {
            let exit = tokio::select! {
                // Agent shutdown leaves the engine to the host; the panel can
                // reconnect to it via a fresh agent process.
                _ = shutdown.cancelled() => return,
                exit = child.wait() => exit,
            };
            if self.state.lock().generation != generation {
                return;
            }
            let exit_code = exit.as_ref().ok().and_then(|status| status.code());

            if !self.state.lock().intent_running {
                let mut state = self.state.lock();
                if state.generation == generation {
                    state.pid = None;
                    state.started_at_ms = None;
                    state.phase = EnginePhase::Stopped;
                }
                return;
            }

            if exit_code == Some(0) {
                info!("engine exited cleanly; not restarting");
                let mut state = self.state.lock();
                state.pid = None;
                state.started_at_ms = None;
                state.intent_running = false;
                state.phase = EnginePhase::Stopped;
                return;
            }

            warn!(?exit_code, "engine exited unexpectedly");
            match self.recover(generation, &shutdown).await {
                Some(next) => child = next,
                None => return,
            }
        }
    }

    /// Crash recovery: wait `crash_count × 1s`, respawn, repeat on launch
    /// failure. Gives up once the counter passes `max_restarts`.
    async fn recover(
        self: &Arc<Self>,
        generation: u64,
        shutdown: &CancellationToken,
    ) -> Option<Child> {
        loop {
            let count = {
                let mut state = self.state.lock();
                if state.generation != generation {
                    return None;
                }
                state.pid = None;
                state.started_at_ms = None;
                state.crash_count += 1;
                if state.crash_count > self.max_restarts {
                    state.phase = EnginePhase::Exhausted;
                    state.intent_running = false;
                    error!(
                        crashes = state.crash_count,
                        max_restarts = self.max_restarts,
                        "engine crash budget exhausted; awaiting explicit start"
                    );
                    return None;
                }
                state.phase = EnginePhase::Crashed;
                state.crash_count
            };

            info!(attempt = count, delay_secs = count, "restarting engine after crash");
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(Duration::from_secs(u64::from(count))) => {}
            }

            let _ops = self.ops.lock().await;
            {
                let state = self.state.lock();
                if state.generation != generation || !state.intent_running {
                    return None;
                }
            }
            match self.spawn_engine() {
                Ok((child, pid)) => {
                    let mut state = self.state.lock();
                    state.phase = EnginePhase::Running;
                    state.pid = Some(pid);
                    state.started_at_ms = Some(SystemClock.epoch_ms());
                    // Counter intentionally survives recovery respawns; only
                    // an explicit start() resets it.
                    info!(pid, attempt = count, "engine restarted after crash");
                    return Some(child);
                }
                Err(e) => {
                    warn!(error = %e, attempt = count, "crash-recovery launch failed");
                }
            }
        }
    }

    // ── Config file management ────────────────────────────────────────

    /// Read the live engine config file.
    pub async fn read_config(&self) -> Result<Vec<u8>, AgentError> {
        tokio::fs::read(&self.config_path)
            .await
            .map_err(|e| AgentError::from_io(&self.config_path, e))
    }

    /// Run the candidate bytes through the engine's `-test` mode.
    ///
    /// Pure predicate over the bytes (modulo engine version changes); never
    /// touches the live config.
    pub async fn validate_config(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let dir = parent_dir(&self.config_path);
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::Builder::new()
            .prefix(".validate-")
            .suffix(".json")
            .tempfile_in(dir)?;
        tokio::fs::write(tmp.path(), bytes).await?;
        self.run_engine_test(tmp.path(), cancel).await
    }

    /// Validate, back up (best-effort), atomically replace the live config,
    /// and restart the engine if it is currently running.
    ///
    /// An `InvalidConfig` failure happens before any write; the on-disk
    /// config is byte-identical to its pre-call contents.
    pub async fn update_config(
        self: &Arc<Self>,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let _ops = self.ops.lock().await;
        self.validate_config(bytes, cancel).await?;

        if let Err(e) = self.backup_config() {
            warn!(error = %e, "pre-apply backup failed; applying anyway");
        }

        atomic_write(&self.config_path, bytes).await?;
        info!(path = %self.config_path.display(), "engine config applied");

        if self.live_pid().is_some() {
            self.stop_locked(cancel).await?;
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(SETTLE_DELAY) => {}
            }
            self.start_locked(cancel).await?;
        }
        Ok(())
    }

    /// Copy the live config into the backup directory, named by timestamp.
    /// Returns `None` (not an error) when there is no config to back up.
    pub fn backup_config(&self) -> Result<Option<PathBuf>, AgentError> {
        if !self.config_path.exists() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.backup_dir)?;
        let name = format!("xray-config-{}.json", Utc::now().format("%Y%m%d-%H%M%S"));
        let dest = self.backup_dir.join(name);
        std::fs::copy(&self.config_path, &dest)?;
        debug!(backup = %dest.display(), "engine config backed up");
        if let Err(e) = self.prune_backups() {
            warn!(error = %e, "backup pruning failed");
        }
        Ok(Some(dest))
    }

    /// Validate a backup and promote it to the live config. Does not restart
    /// the engine; the caller decides.
    pub async fn restore_config(
        &self,
        backup: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let bytes = tokio::fs::read(backup).await.map_err(|e| AgentError::from_io(backup, e))?;
        self.validate_config(&bytes, cancel).await?;
        atomic_write(&self.config_path, &bytes).await?;
        info!(backup = %backup.display(), "engine config restored from backup");
        Ok(())
    }

    /// Keep only the newest `backup_retention` backups. Timestamp-named
    /// files sort lexicographically, oldest first.
    fn prune_backups(&self) -> Result<(), AgentError> {
        let mut backups: Vec<PathBuf> = std::fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("xray-config-") && n.ends_with(".json"))
            })
            .collect();
        if backups.len() <= self.backup_retention {
            return Ok(());
        }
        backups.sort();
        let excess = backups.len() - self.backup_retention;
        for stale in backups.into_iter().take(excess) {
            if let Err(e) = std::fs::remove_file(&stale) {
                warn!(path = %stale.display(), error = %e, "failed to remove stale backup");
            }
        }
        Ok(())
    }

    async fn run_engine_test(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("run")
            .arg("-test")
            .arg("-c")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            output = command.output() => {
                output.map_err(|e| AgentError::LaunchFailed(e.to_string()))?
            }
        };
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Err(AgentError::InvalidConfig(detail))
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Atomic replace: write to a temp file in the same directory, then rename.
async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AgentError> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        file.write_all(bytes).await?;
        file.sync_all().await?;
    }
    tmp.persist(path).map_err(|e| AgentError::Io(e.error))?;
    Ok(())
}

enum EngineSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: EngineSignal) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let signal = match signal {
        EngineSignal::Term => Signal::SIGTERM,
        EngineSignal::Kill => Signal::SIGKILL,
    };
    // ESRCH just means the process is already gone
    let _ = kill(Pid::from_raw(pid as i32), signal);
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: EngineSignal) {}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
