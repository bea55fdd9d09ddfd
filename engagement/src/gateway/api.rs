//! Query endpoints and HTTP ingress

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::arbiter::{BattleStatus, LedgerSnapshot};
use crate::dispatch::DispatchSnapshot;
use crate::events::{Event, HistoryEntry, RawEvent};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub peers: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: BattleStatus,
    pub ledger_snapshot: Option<LedgerSnapshot>,
    pub dispatch: DispatchSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub count: usize,
    pub entries: Vec<HistoryEntry>,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        peers: state.hub.peer_count(),
    })
}

pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let ledger_snapshot = state.ledger.borrow().clone();
    Json(StatusResponse {
        status: ledger_snapshot
            .as_ref()
            .map_or(BattleStatus::Ongoing, |snapshot| snapshot.status),
        ledger_snapshot,
        dispatch: state.dispatch.borrow().clone(),
    })
}

pub(super) async fn progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let entries = state.hub.history().entries();
    Json(ProgressResponse {
        count: entries.len(),
        entries,
    })
}

/// Publish one wire event. The body is read as text so malformed JSON gets
/// the same 400 as a missing field.
pub(super) async fn ingest(State(state): State<AppState>, body: String) -> Response {
    let published: Result<Arc<Event>, String> = RawEvent::from_json(&body)
        .map_err(|e| e.to_string())
        .and_then(|raw| {
            state
                .hub
                .publish_raw(state.hub.ingress_id(), raw)
                .map_err(|e| e.to_string())
        });

    match published {
        Ok(event) => (StatusCode::ACCEPTED, Json(event.as_ref().clone())).into_response(),
        Err(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response(),
    }
}
