//! Kill-chain progress tracking
//!
//! Reads attacker events, resolves each one to an [`AttackStep`] and folds
//! it into [`StageProgress`]. Every change to a stage's recorded value is
//! announced on the bus with a `stage_advanced` extension so the arbiter and
//! any UI can follow along.
//!
//! Recorded progress is overwritten, never clamped upward: a later reading
//! of 40% replaces an earlier 100%.

pub mod classifier;
pub mod stages;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::{Event, EventSink};
use crate::identity::{AgentIdentities, Role};
use crate::runtime::BusConsumer;

pub use classifier::classify;
pub use stages::{AttackStep, KillChainStage, StageProgress, StepStatus};

/// Extension key carried by stage notifications
pub const STAGE_ADVANCED_KEY: &str = "stage_advanced";

/// A change in one stage's recorded progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAdvance {
    #[serde(flatten)]
    pub step: AttackStep,
    pub previous_progress: u8,
    pub overall_progress: f64,
}

impl StageAdvance {
    /// Bus notification for this change
    pub fn to_event(&self, source: impl Into<String>) -> Event {
        let message = format!(
            "Stage {} at {}% ({}), overall {:.1}%",
            self.step.stage, self.step.progress, self.step.technique, self.overall_progress
        );
        let level = if self.step.status == StepStatus::Completed {
            crate::events::Level::Warning
        } else {
            crate::events::Level::Info
        };
        Event::new(level, source, message).with_extension(
            STAGE_ADVANCED_KEY,
            serde_json::to_value(self).unwrap_or_default(),
        )
    }

    /// Parse a notification back out of an event
    pub fn from_event(event: &Event) -> Option<Self> {
        event
            .extension(STAGE_ADVANCED_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Progress tracker; one per campaign
#[derive(Debug)]
pub struct ProgressTracker {
    identities: AgentIdentities,
    progress: StageProgress,
    last_step: Option<AttackStep>,
}

impl ProgressTracker {
    pub fn new(identities: AgentIdentities) -> Self {
        Self {
            identities,
            progress: StageProgress::default(),
            last_step: None,
        }
    }

    pub fn progress(&self) -> &StageProgress {
        &self.progress
    }

    pub fn last_step(&self) -> Option<&AttackStep> {
        self.last_step.as_ref()
    }

    /// Fold one event in. Returns the change when a stage's value moved.
    pub fn observe(&mut self, event: &Event) -> Option<StageAdvance> {
        if self.identities.role_of(&event.source) != Role::Attacker {
            return None;
        }
        let Some(step) = classify(&event.message) else {
            debug!(message = %event.preview(), "Attacker event left unclassified");
            return None;
        };

        let previous = self.progress.set(step.stage, step.progress);
        self.last_step = Some(step.clone());
        if previous == step.progress {
            return None;
        }

        let advance = StageAdvance {
            previous_progress: previous,
            overall_progress: self.progress.overall(),
            step,
        };
        info!(
            stage = %advance.step.stage,
            from = previous,
            to = advance.step.progress,
            overall = advance.overall_progress,
            "Stage progress changed"
        );
        Some(advance)
    }
}

#[async_trait]
impl BusConsumer for ProgressTracker {
    fn name(&self) -> &str {
        "tracker"
    }

    async fn on_event(&mut self, event: Arc<Event>, sink: &dyn EventSink) {
        if let Some(advance) = self.observe(&event) {
            sink.emit(advance.to_event(self.identities.tracker.clone()));
        }
    }
}
