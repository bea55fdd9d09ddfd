//! Victory arbiter loop state

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::ledger::{BattleLedger, BattleStatus, LedgerSnapshot};
use super::rules::{apply_attack, apply_defense};
use crate::events::{Event, EventSink};
use crate::identity::{AgentIdentities, Role};
use crate::runtime::BusConsumer;
use crate::tracker::StageAdvance;

/// Extension key for the ledger snapshot attached to verdict events
pub const BATTLE_STATE_KEY: &str = "battle_state";
/// Extension key for the closing report
pub const BATTLE_REPORT_KEY: &str = "battle_report";

/// Whether a message announces the end of the engagement
pub fn is_verdict(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("victory") || lower.contains("engagement over")
}

fn verdict_message(status: BattleStatus) -> &'static str {
    match status {
        BattleStatus::AttackVictory => "Engagement over: attack victory",
        BattleStatus::DefenseVictory => "Engagement over: defense victory",
        BattleStatus::Ongoing => "Engagement ongoing",
    }
}

#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    /// Deadline after the first attacker event
    pub campaign_timeout: Duration,
    /// How often the deadline is checked without traffic
    pub tick: Duration,
    pub require_all_defense_actions: bool,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            campaign_timeout: Duration::from_secs(15 * 60),
            tick: Duration::from_secs(5),
            require_all_defense_actions: false,
        }
    }
}

/// Owns the battle ledger and decides the outcome
pub struct VictoryArbiter {
    identities: AgentIdentities,
    settings: ArbiterSettings,
    ledger: Option<BattleLedger>,
    defense_completion_announced: bool,
    timeout_logged: bool,
    snapshot_tx: watch::Sender<Option<LedgerSnapshot>>,
}

impl VictoryArbiter {
    pub fn new(identities: AgentIdentities, settings: ArbiterSettings) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            identities,
            settings,
            ledger: None,
            defense_completion_announced: false,
            timeout_logged: false,
            snapshot_tx,
        }
    }

    /// Snapshot feed; `None` until the campaign starts
    pub fn subscribe(&self) -> watch::Receiver<Option<LedgerSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn ledger(&self) -> Option<&BattleLedger> {
        self.ledger.as_ref()
    }

    pub fn status(&self) -> BattleStatus {
        self.ledger.as_ref().map_or(BattleStatus::Ongoing, BattleLedger::status)
    }

    /// Fold one event into the ledger. Returns the verdict if this event
    /// resolved the campaign.
    pub fn observe_at(
        &mut self,
        event: &Event,
        now: DateTime<Utc>,
        sink: &dyn EventSink,
    ) -> Option<BattleStatus> {
        let role = self.identities.role_of(&event.source);
        if role.is_internal() && role != Role::Tracker {
            return self.check_timeout(now, sink);
        }
        if role == Role::Attacker && self.ledger.is_none() {
            self.start(now, sink);
        }
        let ledger = self.ledger.as_mut()?;
        if ledger.is_frozen() {
            return None;
        }

        let changed = match role {
            Role::Attacker => apply_attack(ledger, &event.message),
            Role::Defense(class) => apply_defense(ledger, class, &event.message),
            Role::Tracker => match StageAdvance::from_event(event) {
                Some(advance) => ledger.set_stage_progress(advance.step.stage, advance.step.progress),
                None => false,
            },
            _ => false,
        };

        let verdict = if changed {
            debug!(source = %event.source, "Ledger updated");
            self.evaluate(now, sink)
        } else {
            None
        };
        verdict.or_else(|| self.check_timeout(now, sink))
    }

    /// Apply the timeout fallback once the deadline has passed
    pub fn check_timeout(&mut self, now: DateTime<Utc>, sink: &dyn EventSink) -> Option<BattleStatus> {
        let ledger = self.ledger.as_ref()?;
        if ledger.is_frozen() {
            return None;
        }
        let expired = (now - ledger.start_time())
            .to_std()
            .is_ok_and(|elapsed| elapsed >= self.settings.campaign_timeout);
        if !expired {
            return None;
        }

        let status = ledger.timeout_verdict();
        if !status.is_terminal() {
            if !self.timeout_logged {
                warn!("Campaign deadline passed with no decisive flags, staying ongoing");
                self.timeout_logged = true;
            }
            return None;
        }
        info!(%status, "Campaign deadline passed, applying fallback verdict");
        self.resolve(status, now, sink)
    }

    fn start(&mut self, now: DateTime<Utc>, sink: &dyn EventSink) {
        let ledger = BattleLedger::new(now)
            .with_all_defense_actions_required(self.settings.require_all_defense_actions);
        info!(start = %now, "Engagement started");
        sink.emit(Event::info(self.identities.arbiter.clone(), "Engagement started").at(now));
        self.ledger = Some(ledger);
        self.publish();
    }

    fn evaluate(&mut self, now: DateTime<Utc>, sink: &dyn EventSink) -> Option<BattleStatus> {
        let ledger = self.ledger.as_ref()?;
        if ledger.defense_work_completed() && !self.defense_completion_announced {
            self.defense_completion_announced = true;
            info!("Defense work completed");
            sink.emit(Event::info(
                self.identities.arbiter.clone(),
                "Defense work completed, evaluating final outcome",
            ));
        }

        let status = ledger.evaluate();
        if status.is_terminal() {
            return self.resolve(status, now, sink);
        }
        self.publish();
        None
    }

    fn resolve(&mut self, status: BattleStatus, now: DateTime<Utc>, sink: &dyn EventSink) -> Option<BattleStatus> {
        let ledger = self.ledger.as_mut()?;
        if !ledger.resolve(status, now) {
            return None;
        }
        let snapshot = ledger.snapshot();
        let report = ledger.report(now);
        info!(
            %status,
            duration = %report.duration,
            attack_stages = report.attack_stages_completed,
            defense_actions = report.defense_actions_taken,
            "Engagement resolved"
        );

        let source = self.identities.arbiter.clone();
        let verdict = match status {
            BattleStatus::AttackVictory => Event::critical(source.clone(), verdict_message(status)),
            _ => Event::success(source.clone(), verdict_message(status)),
        };
        sink.emit(verdict.with_extension(
            BATTLE_STATE_KEY,
            serde_json::to_value(&snapshot).unwrap_or_default(),
        ));
        sink.emit(
            Event::info(
                source,
                format!(
                    "Battle report: {} attack stages, {} defense actions, duration {}",
                    report.attack_stages_completed, report.defense_actions_taken, report.duration
                ),
            )
            .with_extension(BATTLE_REPORT_KEY, serde_json::to_value(&report).unwrap_or_default()),
        );
        self.publish();
        Some(status)
    }

    fn publish(&self) {
        let snapshot = self.ledger.as_ref().map(BattleLedger::snapshot);
        self.snapshot_tx.send_replace(snapshot);
    }
}

#[async_trait]
impl BusConsumer for VictoryArbiter {
    fn name(&self) -> &str {
        "arbiter"
    }

    async fn on_event(&mut self, event: Arc<Event>, sink: &dyn EventSink) {
        self.observe_at(&event, Utc::now(), sink);
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.settings.tick)
    }

    async fn on_tick(&mut self, sink: &dyn EventSink) {
        self.check_timeout(Utc::now(), sink);
    }
}
