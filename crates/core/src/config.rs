// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed agent configuration with layered load: YAML file, then an
//! `AGENT_`-prefixed environment overlay, then validation.
//!
//! The configuration is immutable after startup. Validation runs before any
//! component is started; a validation failure is the only fatal runtime error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration load/validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value}")]
    BadOverride { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parse a duration string like "500ms", "30s", "5m", "1h" into a Duration
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the numeric prefix
    let (num_str, suffix) = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, ""));

    let num: u64 = num_str.parse().map_err(|_| format!("invalid number in duration: {}", s))?;

    let multiplier = match suffix.trim() {
        "ms" | "millis" | "millisecond" | "milliseconds" => {
            return Ok(Duration::from_millis(num));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86400,
        other => return Err(format!("unknown duration suffix: {}", other)),
    };

    Ok(Duration::from_secs(num * multiplier))
}

/// Serde adapter: durations are human strings ("30s", "5m") in the YAML file.
mod duration_str {
    use super::parse_duration;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        if d.subsec_millis() != 0 {
            ser.serialize_str(&format!("{}ms", d.as_millis()))
        } else {
            ser.serialize_str(&format!("{}s", d.as_secs()))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(de)?;
        parse_duration(&s).map_err(de::Error::custom)
    }
}

/// Node identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Display name reported to the panel on registration
    pub name: String,
    /// Opaque shared secret, sent as `X-Node-Token` on every panel request
    pub token: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let name = std::env::var("HOSTNAME").unwrap_or_else(|_| "warden-node".to_string());
        Self { name, token: String::new() }
    }
}

/// Panel endpoint and reconnection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSection {
    pub url: String,
    pub tls_skip_verify: bool,
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_str")]
    pub reconnect_interval_initial: Duration,
    #[serde(with = "duration_str")]
    pub reconnect_interval_max: Duration,
    #[serde(with = "duration_str")]
    pub heartbeat_interval: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            tls_skip_verify: false,
            connect_timeout: Duration::from_secs(10),
            reconnect_interval_initial: Duration::from_secs(5),
            reconnect_interval_max: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            max_consecutive_failures: 10,
        }
    }
}

/// Managed engine paths and restart policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub binary_path: PathBuf,
    pub config_path: PathBuf,
    pub backup_dir: PathBuf,
    /// Crash-restart budget before the supervisor gives up
    pub max_restarts: u32,
    /// Keep the newest N backups when pruning
    pub backup_retention: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("/usr/local/bin/xray"),
            config_path: PathBuf::from("/etc/xray/config.json"),
            backup_dir: PathBuf::from("/etc/xray/backups"),
            max_restarts: 3,
            backup_retention: 10,
        }
    }
}

/// Config reconciliation loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    #[serde(with = "duration_str")]
    pub sync_interval: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_str")]
    pub retry_interval: Duration,
    pub validate_before_apply: bool,
    pub backup_before_apply: bool,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            max_retries: 2,
            retry_interval: Duration::from_secs(10),
            validate_before_apply: true,
            backup_before_apply: true,
        }
    }
}

/// Local health/metrics HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub host: String,
    pub port: u16,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

/// Log level/format/output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text, output: LogOutput::Stderr }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log destination: the literal string "stderr", or a file path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogOutput {
    Stderr,
    File(PathBuf),
}

impl From<String> for LogOutput {
    fn from(s: String) -> Self {
        if s == "stderr" {
            LogOutput::Stderr
        } else {
            LogOutput::File(PathBuf::from(s))
        }
    }
}

impl From<LogOutput> for String {
    fn from(o: LogOutput) -> Self {
        match o {
            LogOutput::Stderr => "stderr".to_string(),
            LogOutput::File(path) => path.display().to_string(),
        }
    }
}

/// Complete agent configuration (immutable after startup)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub node: NodeSection,
    pub panel: PanelSection,
    pub engine: EngineSection,
    pub reconcile: ReconcileSection,
    pub health: HealthSection,
    pub log: LogSection,
}

impl AgentConfig {
    /// Load from a YAML file, apply the `AGENT_` environment overlay, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config: AgentConfig = serde_yaml::from_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides via a lookup function.
    ///
    /// Keys are `AGENT_<SECTION>_<FIELD>`, e.g. `AGENT_PANEL_URL` or
    /// `AGENT_NODE_TOKEN`. The lookup indirection keeps this testable without
    /// mutating process environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn bad(key: &str, value: String) -> ConfigError {
            ConfigError::BadOverride { key: key.to_string(), value }
        }

        if let Some(v) = lookup("AGENT_NODE_NAME") {
            self.node.name = v;
        }
        if let Some(v) = lookup("AGENT_NODE_TOKEN") {
            self.node.token = v;
        }
        if let Some(v) = lookup("AGENT_PANEL_URL") {
            self.panel.url = v;
        }
        if let Some(v) = lookup("AGENT_PANEL_TLS_SKIP_VERIFY") {
            self.panel.tls_skip_verify =
                v.parse::<bool>().map_err(|_| bad("AGENT_PANEL_TLS_SKIP_VERIFY", v))?;
        }
        if let Some(v) = lookup("AGENT_PANEL_CONNECT_TIMEOUT") {
            self.panel.connect_timeout =
                parse_duration(&v).map_err(|_| bad("AGENT_PANEL_CONNECT_TIMEOUT", v))?;
        }
        if let Some(v) = lookup("AGENT_PANEL_RECONNECT_INTERVAL_INITIAL") {
            self.panel.reconnect_interval_initial =
                parse_duration(&v).map_err(|_| bad("AGENT_PANEL_RECONNECT_INTERVAL_INITIAL", v))?;
        }
        if let Some(v) = lookup("AGENT_PANEL_RECONNECT_INTERVAL_MAX") {
            self.panel.reconnect_interval_max =
                parse_duration(&v).map_err(|_| bad("AGENT_PANEL_RECONNECT_INTERVAL_MAX", v))?;
        }
        if let Some(v) = lookup("AGENT_PANEL_HEARTBEAT_INTERVAL") {
            self.panel.heartbeat_interval =
                parse_duration(&v).map_err(|_| bad("AGENT_PANEL_HEARTBEAT_INTERVAL", v))?;
        }
        if let Some(v) = lookup("AGENT_PANEL_MAX_CONSECUTIVE_FAILURES") {
            self.panel.max_consecutive_failures =
                v.parse().map_err(|_| bad("AGENT_PANEL_MAX_CONSECUTIVE_FAILURES", v))?;
        }
        if let Some(v) = lookup("AGENT_ENGINE_BINARY_PATH") {
            self.engine.binary_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("AGENT_ENGINE_CONFIG_PATH") {
            self.engine.config_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("AGENT_ENGINE_BACKUP_DIR") {
            self.engine.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("AGENT_ENGINE_MAX_RESTARTS") {
            self.engine.max_restarts = v.parse().map_err(|_| bad("AGENT_ENGINE_MAX_RESTARTS", v))?;
        }
        if let Some(v) = lookup("AGENT_RECONCILE_SYNC_INTERVAL") {
            self.reconcile.sync_interval =
                parse_duration(&v).map_err(|_| bad("AGENT_RECONCILE_SYNC_INTERVAL", v))?;
        }
        if let Some(v) = lookup("AGENT_HEALTH_HOST") {
            self.health.host = v;
        }
        if let Some(v) = lookup("AGENT_HEALTH_PORT") {
            self.health.port = v.parse().map_err(|_| bad("AGENT_HEALTH_PORT", v))?;
        }
        if let Some(v) = lookup("AGENT_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("AGENT_LOG_FORMAT") {
            self.log.format = match v.as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(bad("AGENT_LOG_FORMAT", v)),
            };
        }
        if let Some(v) = lookup("AGENT_LOG_OUTPUT") {
            self.log.output = LogOutput::from(v);
        }
        Ok(())
    }

    /// Startup validation. Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.token.is_empty() {
            return Err(ConfigError::Invalid("node.token must not be empty".into()));
        }
        if self.panel.url.is_empty() {
            return Err(ConfigError::Invalid("panel.url must not be empty".into()));
        }
        if self.health.port == 0 {
            return Err(ConfigError::Invalid("health.port must be in [1,65535]".into()));
        }
        for (name, d) in [
            ("panel.connect_timeout", self.panel.connect_timeout),
            ("panel.reconnect_interval_initial", self.panel.reconnect_interval_initial),
            ("panel.reconnect_interval_max", self.panel.reconnect_interval_max),
            ("panel.heartbeat_interval", self.panel.heartbeat_interval),
            ("reconcile.sync_interval", self.reconcile.sync_interval),
            ("reconcile.retry_interval", self.reconcile.retry_interval),
        ] {
            if d.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if self.panel.reconnect_interval_max < self.panel.reconnect_interval_initial {
            return Err(ConfigError::Invalid(
                "panel.reconnect_interval_max must be >= panel.reconnect_interval_initial".into(),
            ));
        }
        if self.panel.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "panel.max_consecutive_failures must be positive".into(),
            ));
        }
        if self.engine.binary_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("engine.binary_path must not be empty".into()));
        }
        if self.engine.config_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("engine.config_path must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
