//! Reconnect backoff against an unhealthy panel.

use crate::prelude::*;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_agent::{Panel, PanelLiaison};
use warden_core::PanelSection;
use warden_wire::HeartbeatRequest;

const INITIAL: Duration = Duration::from_millis(10);
const MAX: Duration = Duration::from_millis(200);

fn section(url: &str) -> PanelSection {
    PanelSection {
        url: url.to_string(),
        tls_skip_verify: false,
        connect_timeout: Duration::from_secs(2),
        reconnect_interval_initial: INITIAL,
        reconnect_interval_max: MAX,
        heartbeat_interval: Duration::from_millis(50),
        max_consecutive_failures: 4,
    }
}

fn heartbeat_request() -> HeartbeatRequest {
    HeartbeatRequest { node_id: NODE_ID, token: "T".into(), metrics: Default::default() }
}

/// Four failed heartbeats double the backoff each time, capped at the
/// configured maximum: 20ms, 40ms, 80ms, min(160ms, 200ms).
#[tokio::test]
async fn backoff_sequence_doubles_until_cap() {
    let panel = spawn_panel().await;
    panel.state.heartbeat_fail.store(true, Ordering::SeqCst);
    let liaison = PanelLiaison::new(&section(&panel.url), "T".into()).unwrap();
    let cancel = CancellationToken::new();

    let mut observed = Vec::new();
    for _ in 0..4 {
        let err = liaison.heartbeat(heartbeat_request(), &cancel).await.unwrap_err();
        assert!(err.is_transport());
        observed.push(liaison.snapshot().current_backoff);
    }

    let expected: Vec<Duration> =
        (1..=4u32).map(|k| std::cmp::min(INITIAL * 2u32.pow(k), MAX)).collect();
    assert_eq!(observed, expected);
    assert_eq!(liaison.snapshot().consecutive_failures, 4);

    // budget of 4 is spent: the agent stops dialling until reset
    assert!(!liaison.should_reconnect());

    // one healthy exchange resets the machine
    panel.state.heartbeat_fail.store(false, Ordering::SeqCst);
    let response = liaison.heartbeat(heartbeat_request(), &cancel).await.unwrap();
    assert!(response.success);
    let snapshot = liaison.snapshot();
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.current_backoff, INITIAL);
    assert!(liaison.should_reconnect());
}

/// `wait_for_reconnect` sleeps the current backoff and is cancellable.
#[tokio::test]
async fn reconnect_wait_tracks_current_backoff() {
    let panel = spawn_panel().await;
    panel.state.heartbeat_fail.store(true, Ordering::SeqCst);
    let liaison = PanelLiaison::new(&section(&panel.url), "T".into()).unwrap();
    let cancel = CancellationToken::new();

    let _ = liaison.heartbeat(heartbeat_request(), &cancel).await;
    let backoff = liaison.snapshot().current_backoff;
    assert_eq!(backoff, INITIAL * 2);

    let started = std::time::Instant::now();
    liaison.wait_for_reconnect(&cancel).await.unwrap();
    assert!(started.elapsed() >= backoff, "wait should last the whole backoff");

    cancel.cancel();
    let err = liaison.wait_for_reconnect(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
}
