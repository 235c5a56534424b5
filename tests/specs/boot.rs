//! Happy-path boot: register, heartbeat, readiness.

use crate::prelude::*;
use std::sync::atomic::Ordering;
use std::time::Duration;
use warden_agent::AgentOrchestrator;

/// Within one heartbeat interval of boot the agent is registered, the engine
/// is up, and `/health/ready` answers 200.
#[tokio::test]
async fn happy_path_boot_reaches_ready() {
    let panel = spawn_panel().await;
    let dir = tempfile::tempdir().unwrap();
    let config = agent_config(dir.path(), &panel.url);

    let running = AgentOrchestrator::new(config).unwrap().start().await.unwrap();
    let base = format!("http://{}", running.health_addr);

    let registration = running.registration();
    assert!(
        wait_until(|| registration.node_id() == Some(NODE_ID), Duration::from_secs(5)).await,
        "agent should register with the stub panel"
    );
    assert!(running.engine_status().running, "engine should be up after boot");

    let ready = |base: String| async move {
        reqwest::get(format!("{base}/health/ready")).await.map(|r| r.status().as_u16()).unwrap_or(0)
    };
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if ready(base.clone()).await == 200 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "/health/ready never reached 200");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // heartbeats flow and carry engine metrics
    assert!(
        wait_until(|| panel.state.heartbeats.load(Ordering::SeqCst) >= 2, Duration::from_secs(5))
            .await,
        "heartbeats should arrive on the configured interval"
    );
    let body = panel.state.last_heartbeat.lock().unwrap().clone().unwrap();
    assert_eq!(body["node_id"], NODE_ID);
    assert_eq!(body["token"], "T");
    assert_eq!(body["metrics"]["xray_running"], true);

    // composite health reflects registration
    let health: serde_json::Value =
        reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["agent"]["node_id"], NODE_ID);
    assert_eq!(health["agent"]["registered"], true);

    running.shutdown_token().cancel();
    running.wait().await.unwrap();
}

/// A failing heartbeat clears registration; once the panel recovers the
/// agent re-registers on its own.
#[tokio::test]
async fn heartbeat_failure_triggers_re_registration() {
    let panel = spawn_panel().await;
    let dir = tempfile::tempdir().unwrap();
    let config = agent_config(dir.path(), &panel.url);

    let running = AgentOrchestrator::new(config).unwrap().start().await.unwrap();
    let registration = running.registration();
    assert!(wait_until(|| registration.node_id().is_some(), Duration::from_secs(5)).await);
    let registers_before = panel.state.registers.load(Ordering::SeqCst);

    panel.state.heartbeat_fail.store(true, Ordering::SeqCst);
    assert!(
        wait_until(|| !registration.is_registered(), Duration::from_secs(5)).await,
        "heartbeat failure should clear registration"
    );

    panel.state.heartbeat_fail.store(false, Ordering::SeqCst);
    assert!(
        wait_until(|| registration.is_registered(), Duration::from_secs(5)).await,
        "agent should re-register once the panel recovers"
    );
    assert!(panel.state.registers.load(Ordering::SeqCst) > registers_before);

    running.shutdown_token().cancel();
    running.wait().await.unwrap();
}

/// Graceful shutdown stops the health surface and the loops.
#[tokio::test]
async fn shutdown_stops_the_surfaces() {
    let panel = spawn_panel().await;
    let dir = tempfile::tempdir().unwrap();
    let config = agent_config(dir.path(), &panel.url);

    let running = AgentOrchestrator::new(config).unwrap().start().await.unwrap();
    let base = format!("http://{}", running.health_addr);
    assert!(reqwest::get(format!("{base}/health/live")).await.is_ok());

    running.shutdown_token().cancel();
    running.wait().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        reqwest::get(format!("{base}/health/live")).await.is_err(),
        "health surface should stop with the agent"
    );
}
