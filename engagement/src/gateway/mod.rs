//! HTTP and WebSocket surface of the engagement hub
//!
//! - `GET /ws/logs`: bus protocol, one peer per socket
//! - `POST /api/logs`: single-event HTTP ingress
//! - `GET /api/status`, `GET /api/progress`: read-only queries
//! - `GET /health`: liveness

mod api;
mod socket;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;

use crate::arbiter::LedgerSnapshot;
use crate::dispatch::DispatchSnapshot;
use crate::events::SharedEventHub;
use crate::runtime::Orchestrator;

pub use api::{HealthResponse, ProgressResponse, StatusResponse};
pub use socket::logs_handler;

/// Shared handler state; every field is a cheap clone
#[derive(Clone)]
pub struct AppState {
    pub hub: SharedEventHub,
    pub ledger: watch::Receiver<Option<LedgerSnapshot>>,
    pub dispatch: watch::Receiver<DispatchSnapshot>,
}

impl AppState {
    pub fn from_orchestrator(orchestrator: &Orchestrator) -> Self {
        Self {
            hub: orchestrator.hub().clone(),
            ledger: orchestrator.ledger_feed(),
            dispatch: orchestrator.dispatch_feed(),
        }
    }
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/logs", get(socket::logs_handler))
        .route("/api/logs", post(api::ingest))
        .route("/api/status", get(api::status))
        .route("/api/progress", get(api::progress))
        .route("/health", get(api::health))
        .with_state(state)
}
