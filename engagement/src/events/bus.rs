//! Event hub for the engagement
//!
//! Provides fan-out messaging over a Tokio broadcast channel. Every
//! connected party is a [`Peer`] with its own receiver, so a slow or broken
//! peer only ever loses its own events; the publishing side never waits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::EventHistory;
use super::types::{Event, MalformedEvent, RawEvent};

/// Channel capacity for broadcast
pub const CHANNEL_CAPACITY: usize = 256;

/// Identifier of a connected peer
pub type PeerId = Uuid;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Malformed event dropped: {0}")]
    Malformed(#[from] MalformedEvent),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Shared reference to EventHub
pub type SharedEventHub = Arc<EventHub>;

/// An event tagged with the peer that published it
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: PeerId,
    pub event: Arc<Event>,
}

/// Registry entry for a connected peer
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub name: String,
    pub connected_at: DateTime<Utc>,
}

/// Anything that can put events onto the bus.
///
/// Consumers emit through this trait so the same logic works for in-process
/// peers, remote bus connections and test recorders.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        if self.send(event).is_err() {
            debug!("Event sink closed; event discarded");
        }
    }
}

/// Event hub with per-peer fan-out and bounded history
pub struct EventHub {
    sender: broadcast::Sender<Envelope>,
    peers: RwLock<HashMap<PeerId, PeerInfo>>,
    history: EventHistory,
    /// Source name used for bus-generated events.
    identity: String,
    /// Origin used for events that arrive without a peer (HTTP ingress).
    ingress_id: PeerId,
}

impl EventHub {
    /// Create a new hub
    pub fn new(capacity: usize, history_limit: usize, identity: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            history: EventHistory::new(history_limit),
            identity: identity.into(),
            ingress_id: Uuid::new_v4(),
        }
    }

    /// Create a shared reference to this hub
    pub fn shared(self) -> SharedEventHub {
        Arc::new(self)
    }

    /// Register a peer.
    ///
    /// The returned handle yields a welcome event first, then every event
    /// published by any *other* peer. Dropping it disconnects.
    pub fn connect(self: &Arc<Self>, name: impl Into<String>) -> Peer {
        let name = name.into();
        let id = Uuid::new_v4();
        let receiver = self.sender.subscribe();

        let info = PeerInfo {
            id,
            name: name.clone(),
            connected_at: Utc::now(),
        };
        self.write_peers().insert(id, info);
        info!(peer = %name, peer_id = %id, peers = self.peer_count(), "Peer connected");

        let welcome = Event::info(
            self.identity.clone(),
            format!("{name} connected to the engagement bus"),
        );

        Peer {
            id,
            name,
            receiver,
            hub: Arc::clone(self),
            welcome: Some(Arc::new(welcome)),
        }
    }

    /// Deregister a peer. Returns false when it was not registered.
    pub fn disconnect(&self, id: PeerId) -> bool {
        match self.write_peers().remove(&id) {
            Some(info) => {
                info!(peer = %info.name, peer_id = %id, "Peer disconnected");
                true
            }
            None => false,
        }
    }

    /// Validate and publish a raw wire message
    pub fn publish_raw(&self, origin: PeerId, raw: RawEvent) -> BusResult<Arc<Event>> {
        match Event::validate(raw, Utc::now()) {
            Ok(event) => Ok(self.broadcast(origin, event)),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Dropping malformed event");
                Err(e.into())
            }
        }
    }

    /// Publish an already-built event
    pub fn publish(&self, origin: PeerId, event: Event) -> BusResult<Arc<Event>> {
        if let Err(e) = event.ensure_valid() {
            warn!(origin = %origin, error = %e, "Dropping malformed event");
            return Err(e.into());
        }
        Ok(self.broadcast(origin, event))
    }

    fn broadcast(&self, origin: PeerId, event: Event) -> Arc<Event> {
        let event = Arc::new(event);
        self.history.record_event(Arc::clone(&event));

        let envelope = Envelope {
            origin,
            event: Arc::clone(&event),
        };
        match self.sender.send(envelope) {
            Ok(count) => debug!(
                source = %event.source,
                level = %event.level,
                receivers = count,
                "Event published"
            ),
            Err(_) => debug!(source = %event.source, "Event published (no receivers)"),
        }
        event
    }

    /// Raw subscription to every event, including a subscriber's own
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Origin id for events published without a peer connection
    pub fn ingress_id(&self) -> PeerId {
        self.ingress_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    /// Number of registered peers
    pub fn peer_count(&self) -> usize {
        self.read_peers().len()
    }

    /// Snapshot of the peer registry
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.read_peers().values().cloned().collect();
        peers.sort_by_key(|p| p.connected_at);
        peers
    }

    fn read_peers(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PeerId, PeerInfo>> {
        self.peers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_peers(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PeerId, PeerInfo>> {
        self.peers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY, super::history::DEFAULT_HISTORY_LIMIT, "Event Bus")
    }
}

/// A connected bus party
pub struct Peer {
    id: PeerId,
    name: String,
    receiver: broadcast::Receiver<Envelope>,
    hub: SharedEventHub,
    welcome: Option<Arc<Event>>,
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next event from another peer.
    ///
    /// Events lost to lag are logged and skipped; delivery is at most once.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        if let Some(welcome) = self.welcome.take() {
            return Some(welcome);
        }
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.id => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(peer = %self.name, skipped, "Peer lagging; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Publish an event as this peer
    pub fn publish(&self, event: Event) -> BusResult<Arc<Event>> {
        self.hub.publish(self.id, event)
    }

    /// Validate and publish a raw wire message as this peer
    pub fn publish_raw(&self, raw: RawEvent) -> BusResult<Arc<Event>> {
        self.hub.publish_raw(self.id, raw)
    }
}

impl EventSink for Peer {
    fn emit(&self, event: Event) {
        // Failures are already logged by the hub.
        let _ = self.publish(event);
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}
