// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::fake_supervisor;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    base: String,
    supervisor: Arc<EngineSupervisor>,
    registration: Registration,
    cancel: CancellationToken,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let supervisor = fake_supervisor(dir.path(), cancel.clone());
    let collector = MetricsCollector::new(supervisor.clone());
    let registration = Registration::new();
    let surface = HealthSurface::new(
        &HealthSection { host: "127.0.0.1".into(), port: 0 },
        supervisor.clone(),
        collector,
        registration.clone(),
        cancel.clone(),
    );
    let (addr, _handle) = surface.serve().await.unwrap();
    Fixture { _dir: dir, base: format!("http://{}", addr), supervisor, registration, cancel }
}

async fn get_json(url: &str) -> (reqwest::StatusCode, serde_json::Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    let body = response.json().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn live_answers_while_process_is_up() {
    let f = fixture().await;
    let (status, body) = get_json(&format!("{}/health/live", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "alive");
    assert!(body["timestamp"].is_string());
    f.cancel.cancel();
}

#[tokio::test]
async fn ready_lists_failing_reasons() {
    let f = fixture().await;
    let (status, body) = get_json(&format!("{}/health/ready", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let failing: Vec<String> =
        body["failing"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().into()).collect();
    assert!(failing.contains(&"registered".to_string()));
    assert!(failing.contains(&"engine_running".to_string()));
    f.cancel.cancel();
}

#[tokio::test]
async fn ready_requires_registration_and_engine() {
    let f = fixture().await;
    f.registration.set(42);
    f.supervisor.start(&f.cancel).await.unwrap();

    let (status, body) = get_json(&format!("{}/health/ready", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::OK, "{body}");
    assert_eq!(body["status"], "ready");

    f.supervisor.stop(&f.cancel).await.unwrap();
    let (status, _) = get_json(&format!("{}/health/ready", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
    f.cancel.cancel();
}

#[tokio::test]
async fn composite_health_degrades_without_engine() {
    let f = fixture().await;
    f.registration.set(7);
    let (status, body) = get_json(&format!("{}/health", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["agent"]["registered"], true);
    assert_eq!(body["agent"]["node_id"], 7);
    assert_eq!(body["checks"]["engine_running"], false);
    assert!(body["metrics"]["timestamp_ms"].as_u64().unwrap() > 0);
    f.cancel.cancel();
}

#[tokio::test]
async fn engine_status_route_mirrors_supervisor() {
    let f = fixture().await;
    let (status, body) = get_json(&format!("{}/xray/status", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["running"], false);

    f.supervisor.start(&f.cancel).await.unwrap();
    let (status, body) = get_json(&format!("{}/xray/status", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["running"], true);
    assert!(body["pid"].as_u64().is_some());
    f.supervisor.stop(&f.cancel).await.unwrap();
    f.cancel.cancel();
}

#[tokio::test]
async fn metrics_route_serves_snapshot() {
    let f = fixture().await;
    let (status, body) = get_json(&format!("{}/metrics", f.base)).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["engine_running"], false);
    assert!(body.get("cpu_usage").is_some());
    f.cancel.cancel();
}

#[tokio::test]
async fn non_get_methods_are_rejected() {
    let f = fixture().await;
    let client = reqwest::Client::new();
    let response = client.post(format!("{}/health/live", f.base)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    let response = client.delete(format!("{}/metrics", f.base)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    f.cancel.cancel();
}

#[tokio::test]
async fn shutdown_token_stops_the_server() {
    let f = fixture().await;
    f.cancel.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(reqwest::get(format!("{}/health/live", f.base)).await.is_err());
}
