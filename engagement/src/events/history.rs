//! In-memory event history
//!
//! Keeps the most recent events and ledger snapshots, in arrival order, for
//! the progress query. Nothing here outlives the process.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::types::Event;
use crate::arbiter::LedgerSnapshot;

/// Default number of retained entries
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// One entry in the progress history
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// A broadcast event
    Event {
        sequence: u64,
        event: Arc<Event>,
    },
    /// A ledger snapshot taken after an arbiter update
    Ledger {
        sequence: u64,
        recorded_at: DateTime<Utc>,
        snapshot: Box<LedgerSnapshot>,
    },
}

impl HistoryEntry {
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Event { sequence, .. } | Self::Ledger { sequence, .. } => *sequence,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<HistoryEntry>,
    next_sequence: u64,
}

/// Bounded, shared event history
#[derive(Debug)]
pub struct EventHistory {
    limit: usize,
    inner: Mutex<Inner>,
}

impl EventHistory {
    /// Create a history retaining at most `limit` entries
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record a broadcast event
    pub fn record_event(&self, event: Arc<Event>) {
        self.push(|sequence| HistoryEntry::Event { sequence, event });
    }

    /// Record a ledger snapshot
    pub fn record_snapshot(&self, snapshot: LedgerSnapshot) {
        self.push(|sequence| HistoryEntry::Ledger {
            sequence,
            recorded_at: Utc::now(),
            snapshot: Box::new(snapshot),
        });
    }

    fn push(&self, build: impl FnOnce(u64) -> HistoryEntry) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.push_back(build(sequence));
        while inner.entries.len() > self.limit {
            inner.entries.pop_front();
        }
        debug!(sequence, retained = inner.entries.len(), "History entry recorded");
    }

    /// Copy of all retained entries, oldest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        match self.inner.lock() {
            Ok(inner) => inner.entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().entries.iter().cloned().collect(),
        }
    }

    /// Copy of the retained events only, oldest first
    pub fn events(&self) -> Vec<Arc<Event>> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                HistoryEntry::Event { event, .. } => Some(event),
                HistoryEntry::Ledger { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.entries.len(),
            Err(poisoned) => poisoned.into_inner().entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::BattleLedger;

    #[test]
    fn test_history_is_bounded_and_ordered() {
        let history = EventHistory::new(3);
        for i in 0..5 {
            history.record_event(Arc::new(Event::info("Attack Agent", format!("step {i}"))));
        }

        let events = history.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "step 2");
        assert_eq!(events[2].message, "step 4");

        let entries = history.entries();
        assert!(entries.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    }

    #[test]
    fn test_snapshots_interleave_with_events() {
        let history = EventHistory::new(10);
        history.record_event(Arc::new(Event::info("Attack Agent", "a")));
        history.record_snapshot(BattleLedger::new(Utc::now()).snapshot());
        history.record_event(Arc::new(Event::info("Attack Agent", "b")));

        let entries = history.entries();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[1], HistoryEntry::Ledger { .. }));
        assert_eq!(history.events().len(), 2);

        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0]["kind"], "event");
        assert_eq!(json[1]["kind"], "ledger");
    }
}
