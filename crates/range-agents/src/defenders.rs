//! Defense agent endpoints
//!
//! Each route accepts a dispatch payload, acknowledges it right away and
//! schedules a completion cascade: a few defense events, spaced by the
//! configured pace, published under the agent's identity. The cascade
//! messages carry the facts the arbiter scores (threat detected, IP
//! blocked, patch applied, attack traced).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use engagement::config::BusConfig;
use engagement::dispatch::{ClassFields, DispatchPayload};
use engagement::{AgentIdentities, CascadePlan, Event, EventSink, ResponseClass, TransportResult};

/// Shared state behind the defense routes
#[derive(Clone)]
pub struct DefenderState {
    identities: AgentIdentities,
    sinks: HashMap<ResponseClass, Arc<dyn EventSink>>,
    pace: Duration,
}

impl DefenderState {
    pub fn new(identities: AgentIdentities, pace: Duration) -> Self {
        Self {
            identities,
            sinks: HashMap::new(),
            pace,
        }
    }

    /// Route cascades for `class` into `sink`
    pub fn with_sink(mut self, class: ResponseClass, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.insert(class, sink);
        self
    }

    /// Give every defense agent its own reconnecting bus connection.
    pub fn connect(
        identities: AgentIdentities,
        pace: Duration,
        bus: &BusConfig,
    ) -> (Self, Vec<JoinHandle<TransportResult<()>>>) {
        let mut state = Self::new(identities, pace);
        let mut publishers = Vec::with_capacity(ResponseClass::ALL.len());
        for class in ResponseClass::ALL {
            let identity = state.identities.defense_identity(class).to_string();
            let (sink, handle) = bus.client(identity).spawn_publisher();
            state = state.with_sink(class, Arc::new(sink));
            publishers.push(handle);
        }
        (state, publishers)
    }
}

pub fn router(state: DefenderState) -> Router {
    Router::new()
        .route("/execute_threat_blocking", post(threat_blocking))
        .route("/execute_vulnerability_remediation", post(vulnerability_remediation))
        .route("/execute_attack_attribution", post(attack_attribution))
        .with_state(state)
}

async fn threat_blocking(
    State(state): State<DefenderState>,
    Json(payload): Json<DispatchPayload>,
) -> Response {
    execute(&state, ResponseClass::ThreatBlocking, &payload)
}

async fn vulnerability_remediation(
    State(state): State<DefenderState>,
    Json(payload): Json<DispatchPayload>,
) -> Response {
    execute(&state, ResponseClass::VulnerabilityRemediation, &payload)
}

async fn attack_attribution(
    State(state): State<DefenderState>,
    Json(payload): Json<DispatchPayload>,
) -> Response {
    execute(&state, ResponseClass::AttackAttribution, &payload)
}

fn execute(state: &DefenderState, class: ResponseClass, payload: &DispatchPayload) -> Response {
    let identity = state.identities.defense_identity(class);
    let Some(plan) = completion_cascade(class, payload, identity, state.pace) else {
        warn!(class = %class, "Payload fields do not match the endpoint");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "message": format!("not a {class} payload") })),
        )
            .into_response();
    };

    let steps = plan.len();
    match state.sinks.get(&class) {
        Some(sink) => {
            plan.spawn(Arc::clone(sink));
        }
        None => warn!(class = %class, "No bus sink configured; cascade dropped"),
    }
    info!(
        class = %class,
        source = %payload.context.log_source,
        steps,
        "Defense response accepted"
    );

    Json(json!({
        "status": "success",
        "message": format!("{identity} responding"),
        "class": class.as_str(),
        "cascade_steps": steps,
    }))
    .into_response()
}

/// Build the cascade a defense agent reports after acting on `payload`.
/// `None` when the payload's fields belong to another class.
pub fn completion_cascade(
    class: ResponseClass,
    payload: &DispatchPayload,
    identity: &str,
    pace: Duration,
) -> Option<CascadePlan> {
    let info = &payload.context.extracted_info;
    let plan = CascadePlan::new();
    let plan = match (class, &payload.fields) {
        (ResponseClass::ThreatBlocking, ClassFields::ThreatBlocking { target_network, .. }) => {
            let indicator = info
                .attack_types
                .first()
                .map_or("suspicious activity", String::as_str);
            let plan = plan.then(
                pace,
                Event::warning(identity, format!("Threat detected: {indicator} on {target_network}")),
            );
            let plan = if info.ip_addresses.is_empty() {
                plan.then(
                    pace * 2,
                    Event::success(identity, "Blocked suspicious traffic at the perimeter firewall"),
                )
            } else {
                info.ip_addresses.iter().fold(plan, |plan, ip| {
                    plan.then(
                        pace * 2,
                        Event::success(identity, format!("Successfully blocked malicious IP {ip}")),
                    )
                })
            };
            plan.then(pace, Event::info(identity, "Firewall rules updated"))
        }
        (
            ResponseClass::VulnerabilityRemediation,
            ClassFields::VulnerabilityRemediation { target_systems, .. },
        ) => {
            let cves: Vec<&str> = info
                .vulnerabilities
                .iter()
                .map(String::as_str)
                .filter(|v| v.starts_with("CVE-"))
                .collect();
            let patched = if cves.is_empty() {
                format!("Patched critical vulnerabilities on {target_systems}")
            } else {
                format!("Patched {} on {target_systems}", cves.join(", "))
            };
            plan.then(
                pace * 2,
                Event::info(identity, format!("Scanning {target_systems} for weaknesses")),
            )
            .then(pace * 3, Event::success(identity, patched))
            .then(
                pace * 2,
                Event::success(identity, format!("Restored and hardened server {target_systems}")),
            )
        }
        (
            ResponseClass::AttackAttribution,
            ClassFields::AttackAttribution {
                incident_id,
                source_node,
                target_node,
                ..
            },
        ) => plan
            .then(
                pace * 2,
                Event::info(identity, format!("Collecting evidence for incident {incident_id}")),
            )
            .then(
                pace * 3,
                Event::success(
                    identity,
                    format!("Attack path traced from {source_node} to {target_node}"),
                ),
            )
            .then(
                pace,
                Event::success(identity, format!("Attribution report filed for {incident_id}")),
            ),
        _ => return None,
    };
    Some(plan)
}
