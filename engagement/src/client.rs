//! Remote bus client
//!
//! Connects to a hub's `/ws/logs` endpoint, performs the readiness
//! handshake and exchanges events. [`BusClient::spawn_publisher`] keeps a
//! connection alive in the background and hands back an [`EventSink`] that
//! never blocks the caller. Its queue holds at most
//! [`PUBLISH_QUEUE_CAPACITY`] events; when full, the oldest are dropped.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::{Event, EventSink};
use crate::resilience::{RetryPolicy, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default reconnect delay
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Events a publisher holds while disconnected or behind
pub const PUBLISH_QUEUE_CAPACITY: usize = 1024;

/// Connection settings for one bus participant
#[derive(Debug, Clone)]
pub struct BusClient {
    url: String,
    identity: String,
    retry: RetryPolicy,
}

impl BusClient {
    pub fn new(url: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identity: identity.into(),
            retry: RetryPolicy::unbounded(RECONNECT_DELAY),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// The readiness event sent right after connecting
    pub fn handshake(&self) -> Event {
        Event::info(self.identity.clone(), format!("{} ready", self.identity))
    }

    /// One connection attempt, handshake included
    pub async fn connect_once(&self) -> TransportResult<BusConnection> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        let mut connection = BusConnection { stream };
        connection.send(&self.handshake()).await?;
        info!(url = %self.url, identity = %self.identity, "Connected to engagement bus");
        Ok(connection)
    }

    /// Connect under the retry policy
    pub async fn connect(&self) -> TransportResult<BusConnection> {
        self.retry
            .run("connect to engagement bus", |_| self.connect_once())
            .await
    }

    /// Keep a publishing connection alive in the background.
    ///
    /// Events emitted while disconnected are queued and sent after the next
    /// successful handshake. Frames the hub fans out to this connection are
    /// read and discarded. The task ends once every sink clone is dropped
    /// and the queue is drained, or when a bounded retry policy gives up.
    pub fn spawn_publisher(self) -> (RemoteSink, JoinHandle<TransportResult<()>>) {
        let (sink, rx) = publish_queue(PUBLISH_QUEUE_CAPACITY);
        let handle = tokio::spawn(self.publish_loop(rx));
        (sink, handle)
    }

    async fn publish_loop(self, mut rx: broadcast::Receiver<Event>) -> TransportResult<()> {
        let mut pending: Option<Event> = None;
        loop {
            let mut connection = self.connect().await?;

            loop {
                let event = match pending.take() {
                    Some(event) => event,
                    None => {
                        let queued = tokio::select! {
                            queued = next_queued(&mut rx) => queued,
                            lost = connection.discard_inbound() => {
                                warn!(identity = %self.identity, error = %lost, "Bus connection lost, reconnecting");
                                break;
                            }
                        };
                        let Some(event) = queued else {
                            connection.close().await;
                            return Ok(());
                        };
                        event
                    }
                };
                if let Err(e) = connection.send(&event).await {
                    warn!(identity = %self.identity, error = %e, "Bus connection lost, reconnecting");
                    pending = Some(event);
                    break;
                }
            }
        }
    }
}

fn publish_queue(capacity: usize) -> (RemoteSink, broadcast::Receiver<Event>) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (RemoteSink { tx }, rx)
}

/// Next queued event; `None` once every sink is gone and the queue is empty
async fn next_queued(rx: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Publish queue full, oldest events dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// An open, handshaken bus connection
pub struct BusConnection {
    stream: WsStream,
}

impl BusConnection {
    pub async fn send(&mut self, event: &Event) -> TransportResult<()> {
        self.stream
            .send(Message::Text(event.to_json()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    /// Next well-formed event from the bus. Malformed frames are skipped.
    pub async fn next_event(&mut self) -> TransportResult<Event> {
        while let Some(frame) = self.stream.next().await {
            match frame.map_err(|e| TransportError::Send(e.to_string()))? {
                Message::Text(text) => match Event::from_json(&text, Utc::now()) {
                    Ok(event) => return Ok(event),
                    Err(e) => debug!(error = %e, "Skipping malformed bus frame"),
                },
                Message::Close(_) => return Err(TransportError::Closed),
                _ => {}
            }
        }
        Err(TransportError::Closed)
    }

    /// Read and drop inbound frames until the connection ends
    pub async fn discard_inbound(&mut self) -> TransportError {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Close(_)) => return TransportError::Closed,
                Ok(_) => {}
                Err(e) => return TransportError::Send(e.to_string()),
            }
        }
        TransportError::Closed
    }

    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Fire-and-forget handle onto a background publisher
#[derive(Debug, Clone)]
pub struct RemoteSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink for RemoteSink {
    fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("Publisher stopped, dropping event");
        }
    }
}
