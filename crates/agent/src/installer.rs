// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent engine installation.
//!
//! When the engine binary is already present (configured path, `PATH`, or a
//! known location) this only seeds a default config file on first run.
//! Installation failure is reported but non-fatal: the engine may be managed
//! entirely outside the agent.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::{AgentError, EngineSection};

/// Locations checked besides the configured binary path and `PATH`
const KNOWN_LOCATIONS: &[&str] = &["/usr/local/bin/xray", "/usr/bin/xray", "/opt/xray/xray"];

/// Official installer; invoked only when no binary can be located
#[cfg(target_os = "linux")]
const INSTALL_SCRIPT_URL: &str =
    "https://github.com/XTLS/Xray-install/raw/main/install-release.sh";

/// Minimal engine config seeded when none exists yet: log only, no inbounds,
/// direct outbound. The panel replaces it on the first reconciliation.
const DEFAULT_ENGINE_CONFIG: &str = r#"{
  "log": {
    "loglevel": "warning"
  },
  "inbounds": [],
  "outbounds": [
    {
      "protocol": "freedom",
      "tag": "direct"
    }
  ]
}
"#;

pub struct EngineInstaller {
    binary_path: PathBuf,
    config_path: PathBuf,
}

impl EngineInstaller {
    pub fn new(engine: &EngineSection) -> Self {
        Self { binary_path: engine.binary_path.clone(), config_path: engine.config_path.clone() }
    }

    /// Ensure an engine binary and a config file exist. Idempotent.
    pub async fn ensure_installed(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        if let Some(found) = self.locate() {
            info!(binary = %found.display(), "engine binary present");
            return self.seed_default_config();
        }

        self.install(cancel).await?;

        match self.locate() {
            Some(found) => {
                info!(binary = %found.display(), "engine installed");
                self.seed_default_config()
            }
            None => Err(AgentError::NotFound(self.binary_path.clone())),
        }
    }

    /// Configured path, then `PATH`, then known locations.
    fn locate(&self) -> Option<PathBuf> {
        if is_executable(&self.binary_path) {
            return Some(self.binary_path.clone());
        }
        let file_name = self.binary_path.file_name()?;
        if let Some(paths) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&paths) {
                let candidate = dir.join(file_name);
                if is_executable(&candidate) {
                    return Some(candidate);
                }
            }
        }
        KNOWN_LOCATIONS.iter().map(PathBuf::from).find(|candidate| is_executable(candidate))
    }

    #[cfg(target_os = "linux")]
    async fn install(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        use std::process::Stdio;
        use tokio::process::Command;

        info!("engine binary not found; running installer");
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("curl -fsSL {} | bash -s -- install", INSTALL_SCRIPT_URL))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            output = command.output() => {
                output.map_err(|e| AgentError::LaunchFailed(e.to_string()))?
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::LaunchFailed(format!(
                "engine install script failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    async fn install(&self, _cancel: &CancellationToken) -> Result<(), AgentError> {
        Err(AgentError::LaunchFailed(
            "automatic engine install is only supported on linux".into(),
        ))
    }

    /// Write the minimal default config if none exists yet.
    fn seed_default_config(&self) -> Result<(), AgentError> {
        if self.config_path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, DEFAULT_ENGINE_CONFIG)?;
        warn!(
            path = %self.config_path.display(),
            "seeded default engine config; panel sync will replace it"
        );
        Ok(())
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata().is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;
