//! Defense endpoint tests — dispatch payloads in, completion cascades out.
//!
//! Tests verify:
//! - Each route acknowledges with `"status": "success"`
//! - The cascades of all three agents carry enough facts for a defense victory
//! - Payloads for another class and malformed bodies are rejected
//! - The hub's HTTP defense client accepts the acknowledgement

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use engagement::arbiter::ArbiterSettings;
use engagement::dispatch::{build_payload, DispatchContext, DispatchPayload};
use engagement::{
    AgentIdentities, BattleStatus, DefenseClient, Event, EventSink, HttpDefenseClient,
    ResponseClass, VictoryArbiter,
};
use range_agents::{router, DefenderState};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

const INCIDENT: &str =
    "scan detected on firewall, malicious IP 192.168.100.11 found; CVE-2024-3094 exploited on server web-01";

fn payload(class: ResponseClass) -> DispatchPayload {
    build_payload(class, &DispatchContext::extract("Attack Agent", INCIDENT), Utc::now())
}

fn route(class: ResponseClass) -> String {
    format!("/execute_{}", class.as_str())
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn state_with_channel() -> (DefenderState, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn EventSink> = Arc::new(tx);
    let state = ResponseClass::ALL.into_iter().fold(
        DefenderState::new(AgentIdentities::default(), Duration::from_secs(1)),
        |state, class| state.with_sink(class, Arc::clone(&sink)),
    );
    (state, rx)
}

// ── Acknowledgement and cascades ───────────────────────────────────

#[tokio::test(start_paused = true)]
async fn all_three_cascades_win_the_engagement_for_defense() {
    let (state, mut rx) = state_with_channel();
    let app = router(state);

    for class in ResponseClass::ALL {
        let body = serde_json::to_string(&payload(class)).unwrap();
        let response = app.clone().oneshot(post(&route(class), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{class}");
        let ack: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(ack["status"], "success");
        assert_eq!(ack["class"], class.as_str());
    }

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut cascade = Vec::new();
    while let Ok(event) = rx.try_recv() {
        cascade.push(event);
    }
    assert!(cascade.len() >= 9, "only {} cascade events", cascade.len());

    let mut arbiter = VictoryArbiter::new(AgentIdentities::default(), ArbiterSettings::default());
    let (verdicts, _keep) = mpsc::unbounded_channel::<Event>();
    let now = Utc::now();
    arbiter.observe_at(
        &Event::warning("Attack Agent", "attacker gained access to target host"),
        now,
        &verdicts,
    );
    for event in &cascade {
        arbiter.observe_at(event, now, &verdicts);
    }

    assert_eq!(arbiter.status(), BattleStatus::DefenseVictory);
    let snapshot = arbiter.ledger().unwrap().snapshot();
    assert_eq!(snapshot.blocked_ips, vec!["192.168.100.11"]);
    assert_eq!(snapshot.patched_vulnerabilities, vec!["CVE-2024-3094"]);
}

// ── Rejections ─────────────────────────────────────────────────────

#[tokio::test]
async fn payload_for_another_class_is_rejected() {
    let (state, mut rx) = state_with_channel();
    let body = serde_json::to_string(&payload(ResponseClass::ThreatBlocking)).unwrap();

    let response = router(state)
        .oneshot(post(&route(ResponseClass::AttackAttribution), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (state, _rx) = state_with_channel();
    let response = router(state)
        .oneshot(post(&route(ResponseClass::ThreatBlocking), "not json".to_string()))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

// ── Contract with the hub's client ─────────────────────────────────

#[tokio::test]
async fn http_defense_client_accepts_acknowledgement() {
    let (state, _rx) = state_with_channel();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, router(state)).await });

    let endpoints: HashMap<ResponseClass, String> = ResponseClass::ALL
        .into_iter()
        .map(|class| (class, format!("http://{addr}{}", route(class))))
        .collect();
    let client = HttpDefenseClient::new(endpoints, Duration::from_secs(5)).unwrap();

    for class in ResponseClass::ALL {
        let ack = client.dispatch(class, &payload(class)).await.unwrap();
        assert_eq!(ack.status, "success", "{class}");
    }
    server.abort();
}
