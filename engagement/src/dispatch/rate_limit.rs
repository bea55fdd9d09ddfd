//! Per-class minimum re-trigger intervals

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::rules::ResponseClass;

/// Last-trigger table keyed by response class
#[derive(Debug)]
pub struct RateLimiter {
    intervals: HashMap<ResponseClass, Duration>,
    last_trigger: HashMap<ResponseClass, Instant>,
}

impl RateLimiter {
    pub fn new(intervals: HashMap<ResponseClass, Duration>) -> Self {
        Self {
            intervals,
            last_trigger: HashMap::new(),
        }
    }

    pub fn interval(&self, class: ResponseClass) -> Duration {
        self.intervals
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_interval())
    }

    /// Claim a trigger slot for `class`.
    ///
    /// Returns false when the previous trigger is younger than the class
    /// interval; otherwise records `now` as the new trigger time.
    pub fn try_acquire(&mut self, class: ResponseClass, now: Instant) -> bool {
        let interval = self.interval(class);
        if let Some(last) = self.last_trigger.get(&class) {
            if now.duration_since(*last) < interval {
                return false;
            }
        }
        self.last_trigger.insert(class, now);
        true
    }

    /// Time left before `class` may trigger again
    pub fn remaining(&self, class: ResponseClass, now: Instant) -> Duration {
        self.last_trigger
            .get(&class)
            .map(|last| self.interval(class).saturating_sub(now.duration_since(*last)))
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            ResponseClass::ALL
                .iter()
                .map(|class| (*class, class.default_interval()))
                .collect(),
        )
    }
}
