//! Shared fixtures for engagement integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engagement::dispatch::{DefenseAck, DispatchError, DispatchPayload, DispatchResult};
use engagement::{DefenseClient, Event, EventSink, ResponseClass};

/// Defense client that records every call and answers `success`.
#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<(ResponseClass, DispatchPayload)>>,
    failing: Vec<ResponseClass>,
}

impl RecordingClient {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(classes: &[ResponseClass]) -> Arc<Self> {
        Arc::new(Self {
            failing: classes.to_vec(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<(ResponseClass, DispatchPayload)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, class: ResponseClass) -> usize {
        self.calls.lock().unwrap().iter().filter(|(c, _)| *c == class).count()
    }
}

#[async_trait]
impl DefenseClient for RecordingClient {
    async fn dispatch(
        &self,
        class: ResponseClass,
        payload: &DispatchPayload,
    ) -> DispatchResult<DefenseAck> {
        self.calls.lock().unwrap().push((class, payload.clone()));
        if self.failing.contains(&class) {
            return Err(DispatchError::Status { class, status: 500 });
        }
        Ok(DefenseAck {
            status: "success".to_string(),
            message: None,
            extra: Default::default(),
        })
    }
}

/// Sink that keeps every emitted event.
#[derive(Default)]
pub struct CollectingSink(Mutex<Vec<Event>>);

impl CollectingSink {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

pub fn attacker(message: &str) -> Event {
    Event::info("Attack Agent", message)
}
