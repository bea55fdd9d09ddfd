//! Dispatch engine
//!
//! Turns attacker activity into defense calls. For every event:
//!
//! ```text
//! verdict? ──▶ stop (one way)
//! stopped? ──▶ ignore
//! attacker? ─▶ classify ─▶ dedup ─▶ extract context ─▶ announce
//!                                        │
//!                  ┌─────────────────────┘
//!                  ▼
//!   for class in priority order: rate limit ─▶ POST ─▶ success/error event
//!                                (fixed pause between calls)
//! ```
//!
//! Dedup and rate-limit tables are owned here and mutated only from the
//! consumer loop; the outside world sees [`DispatchSnapshot`] copies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::DefenseClient;
use super::context::DispatchContext;
use super::dedup::{DedupKey, DedupTable, DedupVerdict, DEFAULT_EXACT_TTL, DEFAULT_SEMANTIC_TTL};
use super::payload::build_payload;
use super::rate_limit::RateLimiter;
use super::rules::{ResponseClass, RuleTable};
use crate::arbiter::is_verdict;
use crate::events::{Event, EventSink};
use crate::identity::{AgentIdentities, Role};
use crate::resilience::EndpointHealth;
use crate::runtime::BusConsumer;

/// Tunables for the dispatch engine
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub exact_ttl: Duration,
    pub semantic_ttl: Duration,
    pub intervals: HashMap<ResponseClass, Duration>,
    /// Pause between two calls for the same event.
    pub pause: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            exact_ttl: DEFAULT_EXACT_TTL,
            semantic_ttl: DEFAULT_SEMANTIC_TTL,
            intervals: ResponseClass::ALL
                .iter()
                .map(|class| (*class, class.default_interval()))
                .collect(),
            pause: Duration::from_secs(1),
        }
    }
}

/// Why an event was not considered at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Emitted by an orchestrator component.
    Internal,
    NotAttacker,
    Stopped,
}

/// Result of one class within a triggered event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Delivered,
    RateLimited,
    Failed(String),
}

/// What the engine did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    /// The event was the arbiter's verdict; dispatch is now stopped.
    Halted,
    Unmatched,
    Duplicate(DedupVerdict),
    Triggered {
        context: DispatchContext,
        attempts: Vec<(ResponseClass, Attempt)>,
    },
}

impl DispatchOutcome {
    /// Classes whose endpoint was actually called successfully
    pub fn delivered(&self) -> Vec<ResponseClass> {
        match self {
            Self::Triggered { attempts, .. } => attempts
                .iter()
                .filter(|(_, attempt)| *attempt == Attempt::Delivered)
                .map(|(class, _)| *class)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Externally visible dispatcher state
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSnapshot {
    pub stopped: bool,
    pub dispatched: u64,
    pub failed: u64,
    pub suppressed: u64,
    pub rate_limited: u64,
    pub endpoints: Vec<EndpointHealth>,
}

/// Dispatch engine; one per campaign
pub struct DispatchEngine {
    identities: AgentIdentities,
    rules: RuleTable,
    dedup: DedupTable,
    limiter: RateLimiter,
    client: Arc<dyn DefenseClient>,
    pause: Duration,
    stopped: bool,
    health: HashMap<ResponseClass, EndpointHealth>,
    snapshot: DispatchSnapshot,
    snapshot_tx: watch::Sender<DispatchSnapshot>,
}

impl DispatchEngine {
    pub fn new(
        identities: AgentIdentities,
        settings: DispatchSettings,
        client: Arc<dyn DefenseClient>,
    ) -> Self {
        let health = ResponseClass::ALL
            .iter()
            .map(|class| (*class, EndpointHealth::new(&client.endpoint(*class))))
            .collect();
        let (snapshot_tx, _) = watch::channel(DispatchSnapshot::default());
        let mut engine = Self {
            identities,
            rules: RuleTable::default(),
            dedup: DedupTable::new(settings.exact_ttl, settings.semantic_ttl),
            limiter: RateLimiter::new(settings.intervals),
            client,
            pause: settings.pause,
            stopped: false,
            health,
            snapshot: DispatchSnapshot::default(),
            snapshot_tx,
        };
        engine.publish_snapshot();
        engine
    }

    /// Replace the trigger table
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    /// Receiver for status snapshots
    pub fn subscribe(&self) -> watch::Receiver<DispatchSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        self.snapshot.clone()
    }

    /// Process one event from the bus
    pub async fn handle(&mut self, event: &Event, sink: &dyn EventSink) -> DispatchOutcome {
        let role = self.identities.role_of(&event.source);

        if role == Role::Arbiter && is_verdict(&event.message) {
            if !self.stopped {
                self.stopped = true;
                self.publish_snapshot();
                info!(verdict = %event.preview(), "Verdict observed, dispatch stopped");
                sink.emit(Event::info(
                    self.identities.dispatcher.clone(),
                    "Engagement over detected, defense dispatch stopped",
                ));
            }
            return DispatchOutcome::Halted;
        }

        if self.stopped {
            return DispatchOutcome::Ignored(IgnoreReason::Stopped);
        }
        if role.is_internal() {
            return DispatchOutcome::Ignored(IgnoreReason::Internal);
        }
        if role != Role::Attacker {
            return DispatchOutcome::Ignored(IgnoreReason::NotAttacker);
        }

        let classes = self.rules.classify(&event.message);
        if classes.is_empty() {
            return DispatchOutcome::Unmatched;
        }

        let key = DedupKey::derive(&event.source, &event.message);
        let verdict = self.dedup.check_and_record(&key, Instant::now());
        if !verdict.is_fresh() {
            debug!(source = %event.source, message = %event.preview(), ?verdict, "Duplicate trigger suppressed");
            self.snapshot.suppressed += 1;
            self.publish_snapshot();
            return DispatchOutcome::Duplicate(verdict);
        }

        let context = DispatchContext::extract(&event.source, &event.message);
        let names: Vec<&str> = classes.iter().map(|class| class.as_str()).collect();
        info!(message = %event.preview(), classes = ?names, "Attack activity matched defense triggers");
        sink.emit(Event::info(
            self.identities.dispatcher.clone(),
            format!(
                "Attack activity detected, preparing defense response: {}",
                names.join(", ")
            ),
        ));

        let mut attempts = Vec::with_capacity(classes.len());
        let mut called_any = false;
        for class in classes {
            if !self.limiter.try_acquire(class, Instant::now()) {
                debug!(
                    class = %class,
                    remaining_ms = self.limiter.remaining(class, Instant::now()).as_millis() as u64,
                    "Class rate limited"
                );
                self.snapshot.rate_limited += 1;
                attempts.push((class, Attempt::RateLimited));
                continue;
            }
            if called_any && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            called_any = true;

            let attempt = self.call(class, &context, sink).await;
            attempts.push((class, attempt));
        }

        self.publish_snapshot();
        DispatchOutcome::Triggered { context, attempts }
    }

    async fn call(
        &mut self,
        class: ResponseClass,
        context: &DispatchContext,
        sink: &dyn EventSink,
    ) -> Attempt {
        let payload = build_payload(class, context, Utc::now());
        let result = self.client.dispatch(class, &payload).await;
        let health = self
            .health
            .entry(class)
            .or_insert_with(|| EndpointHealth::new(class.as_str()));

        match result {
            Ok(ack) => {
                health.record_success();
                self.snapshot.dispatched += 1;
                info!(class = %class, status = %ack.status, "Defense agent accepted dispatch");
                sink.emit(Event::success(
                    self.identities.dispatcher.clone(),
                    format!("Triggered {class} defense response"),
                ));
                Attempt::Delivered
            }
            Err(e) => {
                health.record_failure(&e.to_string());
                self.snapshot.failed += 1;
                warn!(class = %class, error = %e, "Defense dispatch failed");
                sink.emit(Event::error(
                    self.identities.dispatcher.clone(),
                    format!("Failed to trigger {class} defense response: {e}"),
                ));
                Attempt::Failed(e.to_string())
            }
        }
    }

    fn publish_snapshot(&mut self) {
        self.snapshot.stopped = self.stopped;
        self.snapshot.endpoints = ResponseClass::ALL
            .iter()
            .filter_map(|class| self.health.get(class).cloned())
            .collect();
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}

#[async_trait]
impl BusConsumer for DispatchEngine {
    fn name(&self) -> &str {
        "dispatcher"
    }

    async fn on_event(&mut self, event: Arc<Event>, sink: &dyn EventSink) {
        self.handle(&event, sink).await;
    }
}
