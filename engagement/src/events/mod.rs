//! Event bus for the engagement
//!
//! This module provides the fan-out messaging every component sits on.
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the wire format, validation and levels.
//!
//! 2. **Event Hub** (`bus.rs`): Tokio broadcast-based fan-out where each
//!    peer owns its receiver and never sees its own events.
//!
//! 3. **Event History** (`history.rs`): bounded in-memory history of
//!    events and ledger snapshots for the progress query.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────────┐
//! │  Producer    │────▶│  Event Hub   │────▶│ Tracker / Dispatcher │
//! │  (publish)   │     │  (broadcast) │     │ Arbiter / UI (recv)  │
//! └──────────────┘     └──────┬───────┘     └──────────────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │   History    │
//!                      │ (in memory)  │
//!                      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use engagement::events::{Event, EventHub};
//!
//! let hub = EventHub::default().shared();
//! let mut tracker = hub.connect("tracker");
//! let attacker = hub.connect("attacker");
//!
//! attacker.publish(Event::info("Attack Agent", "attacker scans firewall"))?;
//! let welcome = tracker.recv().await;
//! let event = tracker.recv().await;
//! ```

pub mod bus;
pub mod history;
pub mod types;

// Re-export core types
pub use bus::{
    BusError, BusResult, Envelope, EventHub, EventSink, Peer, PeerId, PeerInfo, SharedEventHub,
    CHANNEL_CAPACITY,
};
pub use history::{EventHistory, HistoryEntry, DEFAULT_HISTORY_LIMIT};
pub use types::{Event, Level, MalformedEvent, RawEvent};
