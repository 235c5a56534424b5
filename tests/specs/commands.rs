//! Command round-trips through heartbeat responses.

use crate::prelude::*;
use std::time::Duration;
use warden_agent::AgentOrchestrator;

/// A queued `xray_restart` executes once and reports exactly one result
/// bearing the original command id; the following heartbeat reflects the
/// restarted engine.
#[tokio::test]
async fn restart_command_round_trip() {
    let panel = spawn_panel().await;
    let dir = tempfile::tempdir().unwrap();
    let config = agent_config(dir.path(), &panel.url);

    let running = AgentOrchestrator::new(config).unwrap().start().await.unwrap();
    let registration = running.registration();
    assert!(wait_until(|| registration.is_registered(), Duration::from_secs(5)).await);
    let pid_before = running.engine_status().pid;

    panel.queue_command("c1", "xray_restart", "");
    assert!(
        wait_until(|| !panel.results().is_empty(), Duration::from_secs(5)).await,
        "command result should be reported"
    );

    let results = panel.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["command_id"], "c1");
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[0]["data"]["running"], true);

    assert!(running.engine_status().running);
    assert_ne!(running.engine_status().pid, pid_before, "restart should spawn a new process");

    // several more heartbeats pass; still exactly one result for c1
    let beats = panel.state.heartbeats.load(std::sync::atomic::Ordering::SeqCst);
    assert!(
        wait_until(
            || panel.state.heartbeats.load(std::sync::atomic::Ordering::SeqCst) >= beats + 3,
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(panel.results().len(), 1, "exactly one result per command");

    let body = panel.state.last_heartbeat.lock().unwrap().clone().unwrap();
    assert_eq!(body["metrics"]["xray_running"], true);

    running.shutdown_token().cancel();
    running.wait().await.unwrap();
}

/// Commands from one heartbeat run serially in panel order; an unknown type
/// yields a failed result without disturbing its neighbors.
#[tokio::test]
async fn ordered_batch_with_unknown_command() {
    let panel = spawn_panel().await;
    let dir = tempfile::tempdir().unwrap();
    let config = agent_config(dir.path(), &panel.url);

    let running = AgentOrchestrator::new(config).unwrap().start().await.unwrap();
    let registration = running.registration();
    assert!(wait_until(|| registration.is_registered(), Duration::from_secs(5)).await);

    panel.queue_command("c1", "xray_status", "");
    panel.queue_command("c2", "self_destruct", "");
    panel.queue_command("c3", "system_metrics", "");

    assert!(
        wait_until(|| panel.results().len() == 3, Duration::from_secs(5)).await,
        "all three results should be reported"
    );
    let results = panel.results();
    let ids: Vec<&str> = results.iter().map(|r| r["command_id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["c1", "c2", "c3"], "results arrive in panel order");

    assert_eq!(results[0]["success"], true);
    assert_eq!(results[1]["success"], false);
    assert_eq!(results[1]["message"], "unknown command type: self_destruct");
    assert_eq!(results[2]["success"], true);
    assert!(results[2]["data"]["timestamp_ms"].as_u64().unwrap() > 0);

    running.shutdown_token().cancel();
    running.wait().await.unwrap();
}

/// `config_sync` without payload pulls the panel's config and applies it.
#[tokio::test]
async fn config_sync_command_applies_panel_config() {
    let panel = spawn_panel().await;
    let dir = tempfile::tempdir().unwrap();
    let config = agent_config(dir.path(), &panel.url);
    let live_path = config.engine.config_path.clone();

    *panel.state.config_body.lock().unwrap() = "{\"version\":\"v2\",\"timestamp\":2}".to_string();

    let running = AgentOrchestrator::new(config).unwrap().start().await.unwrap();
    let registration = running.registration();
    assert!(wait_until(|| registration.is_registered(), Duration::from_secs(5)).await);

    panel.queue_command("c1", "config_sync", "");
    assert!(wait_until(|| !panel.results().is_empty(), Duration::from_secs(5)).await);
    assert_eq!(panel.results()[0]["success"], true);
    assert_eq!(std::fs::read(&live_path).unwrap(), b"{\"version\":\"v2\",\"timestamp\":2}");

    running.shutdown_token().cancel();
    running.wait().await.unwrap();
}
