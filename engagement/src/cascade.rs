//! Completion cascades
//!
//! A cascade is an ordered list of `(delay, Event)` steps, each delay
//! relative to the previous step. One task drives the whole plan, so
//! event order is fixed and the timing is deterministic under paused time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{Event, EventSink};

#[derive(Debug, Clone, Default)]
pub struct CascadePlan {
    steps: Vec<(Duration, Event)>,
}

impl CascadePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step fired `delay` after the previous one
    pub fn then(mut self, delay: Duration, event: Event) -> Self {
        self.steps.push((delay, event));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all step delays
    pub fn total_delay(&self) -> Duration {
        self.steps.iter().map(|(delay, _)| *delay).sum()
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.steps.iter().map(|(_, event)| event)
    }

    /// Play the plan into `sink`. Timestamps are set at emission.
    pub async fn run(self, sink: &dyn EventSink) -> usize {
        let total = self.steps.len();
        for (index, (delay, event)) in self.steps.into_iter().enumerate() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!(step = index + 1, total, source = %event.source, "Cascade step");
            sink.emit(event.at(Utc::now()));
        }
        total
    }

    /// Play the plan on its own task
    pub fn spawn(self, sink: Arc<dyn EventSink>) -> JoinHandle<usize> {
        tokio::spawn(async move { self.run(sink.as_ref()).await })
    }
}
