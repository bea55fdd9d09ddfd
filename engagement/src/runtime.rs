//! Consumer loops and orchestrator wiring
//!
//! Each component runs as its own bus peer with one sequential loop. The
//! loop owns the component's state; everyone else reads snapshots through
//! watch channels.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::arbiter::{ArbiterSettings, LedgerSnapshot, VictoryArbiter};
use crate::dispatch::{DefenseClient, DispatchEngine, DispatchSettings, DispatchSnapshot};
use crate::events::{Event, EventSink, Peer, SharedEventHub};
use crate::identity::AgentIdentities;
use crate::tracker::ProgressTracker;

/// A component that reacts to bus events
#[async_trait]
pub trait BusConsumer: Send {
    /// Peer name on the bus
    fn name(&self) -> &str;

    async fn on_event(&mut self, event: Arc<Event>, sink: &dyn EventSink);

    /// Period for [`BusConsumer::on_tick`]; `None` disables ticking
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    async fn on_tick(&mut self, _sink: &dyn EventSink) {}
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Drive a consumer from a peer until the bus closes
pub async fn run_consumer<C: BusConsumer>(mut peer: Peer, mut consumer: C) -> C {
    let mut ticker = consumer.tick_interval().map(|period| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    debug!(consumer = consumer.name(), peer = %peer.id(), "Consumer loop started");

    loop {
        tokio::select! {
            event = peer.recv() => match event {
                Some(event) => consumer.on_event(event, &peer).await,
                None => break,
            },
            _ = next_tick(&mut ticker) => consumer.on_tick(&peer).await,
        }
    }

    debug!(consumer = consumer.name(), "Consumer loop finished");
    consumer
}

/// Connect a consumer to the hub and spawn its loop
pub fn spawn_consumer<C>(hub: &SharedEventHub, consumer: C) -> JoinHandle<C>
where
    C: BusConsumer + 'static,
{
    let peer = hub.connect(consumer.name().to_string());
    tokio::spawn(run_consumer(peer, consumer))
}

/// Everything the orchestrator needs to start
#[derive(Clone)]
pub struct OrchestratorParts {
    pub identities: AgentIdentities,
    pub dispatch: DispatchSettings,
    pub arbiter: ArbiterSettings,
    pub client: Arc<dyn DefenseClient>,
}

/// The three engagement components wired to one hub
pub struct Orchestrator {
    hub: SharedEventHub,
    ledger: watch::Receiver<Option<LedgerSnapshot>>,
    dispatch: watch::Receiver<DispatchSnapshot>,
    tasks: Vec<AbortHandle>,
}

impl Orchestrator {
    /// Spawn tracker, dispatcher and arbiter as peers of `hub`
    pub fn start(hub: SharedEventHub, parts: OrchestratorParts) -> Self {
        let tracker = ProgressTracker::new(parts.identities.clone());
        let engine = DispatchEngine::new(parts.identities.clone(), parts.dispatch, parts.client);
        let arbiter = VictoryArbiter::new(parts.identities, parts.arbiter);

        let dispatch = engine.subscribe();
        let ledger = arbiter.subscribe();

        // Peers connect here, before the caller can publish anything.
        let tasks = vec![
            spawn_consumer(&hub, tracker).abort_handle(),
            spawn_consumer(&hub, engine).abort_handle(),
            spawn_consumer(&hub, arbiter).abort_handle(),
            tokio::spawn(relay_snapshots(hub.clone(), ledger.clone())).abort_handle(),
        ];
        info!(peers = hub.peer_count(), "Engagement orchestrator started");

        Self {
            hub,
            ledger,
            dispatch,
            tasks,
        }
    }

    pub fn hub(&self) -> &SharedEventHub {
        &self.hub
    }

    /// Latest ledger snapshot, `None` before the campaign starts
    pub fn ledger_snapshot(&self) -> Option<LedgerSnapshot> {
        self.ledger.borrow().clone()
    }

    pub fn dispatch_snapshot(&self) -> DispatchSnapshot {
        self.dispatch.borrow().clone()
    }

    pub fn ledger_feed(&self) -> watch::Receiver<Option<LedgerSnapshot>> {
        self.ledger.clone()
    }

    pub fn dispatch_feed(&self) -> watch::Receiver<DispatchSnapshot> {
        self.dispatch.clone()
    }

    /// Stop every component loop
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Engagement orchestrator stopped");
    }
}

/// Append every ledger change to the hub history
async fn relay_snapshots(hub: SharedEventHub, mut ledger: watch::Receiver<Option<LedgerSnapshot>>) {
    while ledger.changed().await.is_ok() {
        let snapshot = ledger.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            hub.history().record_snapshot(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::EventHub;

    struct Collector {
        seen: Arc<Mutex<Vec<String>>>,
        ticks: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl BusConsumer for Collector {
        fn name(&self) -> &str {
            "collector"
        }

        async fn on_event(&mut self, event: Arc<Event>, sink: &dyn EventSink) {
            self.seen.lock().unwrap().push(event.message.clone());
            if event.message == "ping" {
                sink.emit(Event::info("collector", "pong"));
            }
        }

        fn tick_interval(&self) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }

        async fn on_tick(&mut self, _sink: &dyn EventSink) {
            *self.ticks.lock().unwrap() += 1;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_receives_events_and_ticks() {
        let hub = EventHub::default().shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ticks = Arc::new(Mutex::new(0));
        let handle = spawn_consumer(
            &hub,
            Collector {
                seen: seen.clone(),
                ticks: ticks.clone(),
            },
        );

        let mut observer = hub.connect("observer");
        observer.recv().await.unwrap(); // welcome
        observer.publish(Event::info("tester", "ping")).unwrap();

        let reply = observer.recv().await.unwrap();
        assert_eq!(reply.message, "pong");

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*ticks.lock().unwrap(), 3);
        assert!(seen.lock().unwrap().contains(&"ping".to_string()));
        handle.abort();
    }
}
