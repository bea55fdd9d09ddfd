//! `/ws/logs` bus endpoint
//!
//! Each socket gets a writer task fed through a bounded queue. A client that
//! stops reading loses fan-out events once its queue is full, but whatever it
//! sends still reaches the hub.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::events::{Event, RawEvent, SharedEventHub};

/// Maximum size of a single inbound message (256 KiB)
const MAX_MESSAGE_BYTES: usize = 256 * 1024;

/// Outbound events buffered per socket before fan-out drops them
const OUTBOUND_BUFFER: usize = 64;

/// WebSocket upgrade handler for `/ws/logs`
pub async fn logs_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: SharedEventHub) {
    let session = Uuid::new_v4();
    let mut peer = hub.connect(format!("ws-{}", &session.simple().to_string()[..8]));
    info!(peer = %peer.name(), "Bus socket opened");

    let (sender, mut receiver) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let mut writer = tokio::spawn(write_outbound(sender, out_rx));
    let mut dropped: u64 = 0;

    loop {
        tokio::select! {
            outbound = peer.recv() => {
                let Some(event) = outbound else { break };
                match out_tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        debug!(peer = %peer.name(), dropped, "Socket not draining, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    // Rejections are logged by the hub; the socket stays open.
                    if let Ok(raw) = RawEvent::from_json(&text) {
                        let _ = peer.publish_raw(raw);
                    } else {
                        warn!(peer = %peer.name(), "Dropping non-JSON message");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(peer = %peer.name(), error = %e, "Bus socket error");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(peer = %peer.name(), "Send failed, closing socket");
                break;
            }
        }
    }

    writer.abort();
    if dropped > 0 {
        warn!(peer = %peer.name(), dropped, "Slow socket missed events");
    }
    info!(peer = %peer.name(), "Bus socket closed");
}

async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<Event>>,
) {
    while let Some(event) = rx.recv().await {
        if sender.send(Message::Text(event.to_json())).await.is_err() {
            return;
        }
    }
}
