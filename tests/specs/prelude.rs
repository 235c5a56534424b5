//! Shared fixtures: stub panel, fake engine, agent config builder.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;

use warden_core::AgentConfig;

pub const NODE_ID: i64 = 42;

/// Observable state of the stub panel.
#[derive(Default)]
pub struct StubState {
    pub registers: AtomicUsize,
    pub heartbeats: AtomicUsize,
    /// When set, heartbeats answer 500
    pub heartbeat_fail: AtomicBool,
    /// Commands handed out on the next heartbeat, then drained
    pub queued_commands: Mutex<Vec<Value>>,
    /// Every command result the agent reported
    pub results: Mutex<Vec<Value>>,
    pub last_heartbeat: Mutex<Option<Value>>,
    pub config_body: Mutex<String>,
}

pub struct PanelStub {
    pub url: String,
    pub state: Arc<StubState>,
}

impl PanelStub {
    pub fn queue_command(&self, id: &str, kind: &str, payload: &str) {
        self.state.queued_commands.lock().unwrap().push(serde_json::json!({
            "id": id,
            "type": kind,
            "payload": payload,
        }));
    }

    pub fn results(&self) -> Vec<Value> {
        self.state.results.lock().unwrap().clone()
    }
}

async fn register(State(state): State<Arc<StubState>>, Json(_body): Json<Value>) -> Json<Value> {
    state.registers.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({ "success": true, "node_id": NODE_ID, "message": "" }))
}

async fn heartbeat(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    if state.heartbeat_fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "panel unavailable").into_response();
    }
    state.heartbeats.fetch_add(1, Ordering::SeqCst);
    *state.last_heartbeat.lock().unwrap() = Some(body);
    let commands: Vec<Value> = state.queued_commands.lock().unwrap().drain(..).collect();
    Json(serde_json::json!({ "success": true, "message": "", "commands": commands }))
        .into_response()
}

async fn node_config(State(state): State<Arc<StubState>>) -> Json<Value> {
    let config = state.config_body.lock().unwrap().clone();
    Json(serde_json::json!({ "success": true, "config": config, "message": "" }))
}

async fn command_result(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.results.lock().unwrap().push(body);
    Json(serde_json::json!({ "success": true, "message": "" }))
}

/// Serve a stub panel on an ephemeral port.
pub async fn spawn_panel() -> PanelStub {
    let state = Arc::new(StubState::default());
    *state.config_body.lock().unwrap() = "{\"version\":\"v1\",\"timestamp\":1}".to_string();
    let app = Router::new()
        .route("/api/node/register", post(register))
        .route("/api/node/heartbeat", post(heartbeat))
        .route("/api/node/{node_id}/config", get(node_config))
        .route("/api/node/command/result", post(command_result))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    PanelStub { url: format!("http://{}", addr), state }
}

/// Fake engine honoring the real CLI: `version`, `run -test -c` (rejects
/// configs containing "invalid"), `run -c` (sleeps until signalled).
pub const FAKE_ENGINE: &str = r#"#!/bin/sh
if [ "$1" = "version" ]; then
  echo "FakeEngine 1.0.0 (spec-test)"
  exit 0
fi
config=""
test_mode=0
while [ $# -gt 0 ]; do
  case "$1" in
    -test) test_mode=1 ;;
    -c) shift; config="$1" ;;
  esac
  shift
done
if [ "$test_mode" = 1 ]; then
  if grep -q invalid "$config" 2>/dev/null; then
    echo "config rejected: invalid directive" >&2
    exit 1
  fi
  exit 0
fi
trap 'exit 0' TERM INT
while :; do sleep 1; done
"#;

pub fn write_fake_engine(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-engine");
    std::fs::write(&path, FAKE_ENGINE).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Reserve a port for the health surface. The listener is dropped before the
/// agent binds, so a parallel test could in principle steal it; ports are
/// random enough in practice.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Agent config wired to the stub panel and a fake engine, with spec-test
/// friendly intervals.
pub fn agent_config(dir: &Path, panel_url: &str) -> AgentConfig {
    let binary = write_fake_engine(dir);
    let mut config = AgentConfig::default();
    config.node.name = "spec-node".into();
    config.node.token = "T".into();
    config.panel.url = panel_url.to_string();
    config.panel.connect_timeout = Duration::from_secs(2);
    config.panel.heartbeat_interval = Duration::from_millis(50);
    config.panel.reconnect_interval_initial = Duration::from_millis(10);
    config.panel.reconnect_interval_max = Duration::from_millis(200);
    config.engine.binary_path = binary;
    config.engine.config_path = dir.join("config.json");
    config.engine.backup_dir = dir.join("backups");
    config.reconcile.sync_interval = Duration::from_secs(60);
    config.health.host = "127.0.0.1".into();
    config.health.port = free_port();
    std::fs::write(&config.engine.config_path, b"{\"log\":{\"loglevel\":\"warning\"}}").unwrap();
    config
}

/// Poll until `predicate` holds or `timeout` elapses.
pub async fn wait_until<F: FnMut() -> bool>(mut predicate: F, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    predicate()
}
