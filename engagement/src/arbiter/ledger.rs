//! Battle ledger
//!
//! Authoritative campaign state. Flags are idempotent so the ledger
//! converges regardless of event order; once a verdict is recorded the
//! ledger is frozen and every further mutation is a no-op.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::{KillChainStage, StageProgress};

/// Campaign outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Ongoing,
    AttackVictory,
    DefenseVictory,
}

impl BattleStatus {
    /// Victory states have no outgoing transitions
    pub fn is_terminal(self) -> bool {
        self != Self::Ongoing
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ongoing => write!(f, "ongoing"),
            Self::AttackVictory => write!(f, "attack_victory"),
            Self::DefenseVictory => write!(f, "defense_victory"),
        }
    }
}

/// Attack-side progress flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackFlag {
    Reconnaissance,
    Weaponization,
    Delivery,
    Exploitation,
    Installation,
    CommandAndControl,
    ActionsOnObjectives,
    DataExfiltrated,
}

impl AttackFlag {
    pub const ALL: [AttackFlag; 8] = [
        Self::Reconnaissance,
        Self::Weaponization,
        Self::Delivery,
        Self::Exploitation,
        Self::Installation,
        Self::CommandAndControl,
        Self::ActionsOnObjectives,
        Self::DataExfiltrated,
    ];

    /// Completion flag for a kill-chain stage
    pub fn for_stage(stage: KillChainStage) -> Self {
        match stage {
            KillChainStage::Reconnaissance => Self::Reconnaissance,
            KillChainStage::Weaponization => Self::Weaponization,
            KillChainStage::Delivery => Self::Delivery,
            KillChainStage::Exploitation => Self::Exploitation,
            KillChainStage::Installation => Self::Installation,
            KillChainStage::CommandAndControl => Self::CommandAndControl,
            KillChainStage::ActionsOnObjectives => Self::ActionsOnObjectives,
        }
    }
}

/// Defense-side action flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenseFlag {
    ThreatDetected,
    IpBlocked,
    VulnerabilityPatched,
    SystemRecovered,
    AttackTraced,
    EvidenceCollected,
}

impl DefenseFlag {
    pub const ALL: [DefenseFlag; 6] = [
        Self::ThreatDetected,
        Self::IpBlocked,
        Self::VulnerabilityPatched,
        Self::SystemRecovered,
        Self::AttackTraced,
        Self::EvidenceCollected,
    ];

    /// Flags required for defense work to count as completed by default
    pub const CORE: [DefenseFlag; 4] = [
        Self::ThreatDetected,
        Self::IpBlocked,
        Self::VulnerabilityPatched,
        Self::AttackTraced,
    ];
}

/// Accumulated asset sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSet {
    Compromised,
    Recovered,
    BlockedIps,
    PatchedVulnerabilities,
}

/// Live campaign ledger, owned by the arbiter loop
#[derive(Debug, Clone)]
pub struct BattleLedger {
    status: BattleStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    stage_progress: StageProgress,
    attack_flags: BTreeMap<AttackFlag, bool>,
    defense_flags: BTreeMap<DefenseFlag, bool>,
    compromised_assets: BTreeSet<String>,
    recovered_assets: BTreeSet<String>,
    blocked_ips: BTreeSet<String>,
    patched_vulnerabilities: BTreeSet<String>,
    require_all_defense_actions: bool,
}

impl BattleLedger {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            status: BattleStatus::Ongoing,
            start_time,
            end_time: None,
            stage_progress: StageProgress::default(),
            attack_flags: AttackFlag::ALL.iter().map(|f| (*f, false)).collect(),
            defense_flags: DefenseFlag::ALL.iter().map(|f| (*f, false)).collect(),
            compromised_assets: BTreeSet::new(),
            recovered_assets: BTreeSet::new(),
            blocked_ips: BTreeSet::new(),
            patched_vulnerabilities: BTreeSet::new(),
            require_all_defense_actions: false,
        }
    }

    /// Require all six defense flags instead of the core four
    pub fn with_all_defense_actions_required(mut self, strict: bool) -> Self {
        self.require_all_defense_actions = strict;
        self
    }

    pub fn status(&self) -> BattleStatus {
        self.status
    }

    pub fn is_frozen(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn attack_flag(&self, flag: AttackFlag) -> bool {
        self.attack_flags.get(&flag).copied().unwrap_or(false)
    }

    pub fn defense_flag(&self, flag: DefenseFlag) -> bool {
        self.defense_flags.get(&flag).copied().unwrap_or(false)
    }

    pub fn stage_progress(&self) -> &StageProgress {
        &self.stage_progress
    }

    /// Set an attack flag. Returns true when the ledger changed.
    pub fn set_attack_flag(&mut self, flag: AttackFlag) -> bool {
        if self.is_frozen() || self.attack_flag(flag) {
            return false;
        }
        self.attack_flags.insert(flag, true);
        true
    }

    /// Set a defense flag. Returns true when the ledger changed.
    pub fn set_defense_flag(&mut self, flag: DefenseFlag) -> bool {
        if self.is_frozen() || self.defense_flag(flag) {
            return false;
        }
        self.defense_flags.insert(flag, true);
        true
    }

    /// Add to one of the asset sets. Returns true when the ledger changed.
    pub fn record_asset(&mut self, set: AssetSet, value: impl Into<String>) -> bool {
        if self.is_frozen() {
            return false;
        }
        let target = match set {
            AssetSet::Compromised => &mut self.compromised_assets,
            AssetSet::Recovered => &mut self.recovered_assets,
            AssetSet::BlockedIps => &mut self.blocked_ips,
            AssetSet::PatchedVulnerabilities => &mut self.patched_vulnerabilities,
        };
        target.insert(value.into())
    }

    /// Overwrite a stage's recorded progress. Returns true when it changed.
    pub fn set_stage_progress(&mut self, stage: KillChainStage, percent: u8) -> bool {
        if self.is_frozen() {
            return false;
        }
        let previous = self.stage_progress.set(stage, percent);
        previous != self.stage_progress.get(stage)
    }

    pub fn defense_work_completed(&self) -> bool {
        let required: &[DefenseFlag] = if self.require_all_defense_actions {
            &DefenseFlag::ALL
        } else {
            &DefenseFlag::CORE
        };
        required.iter().all(|flag| self.defense_flag(*flag))
    }

    /// Victory predicates over the current flags
    pub fn evaluate(&self) -> BattleStatus {
        if self.is_frozen() {
            return self.status;
        }
        if !self.defense_work_completed() {
            return BattleStatus::Ongoing;
        }
        if self.attack_flag(AttackFlag::DataExfiltrated) {
            BattleStatus::AttackVictory
        } else {
            BattleStatus::DefenseVictory
        }
    }

    /// Fallback once the campaign has run past its deadline
    pub fn timeout_verdict(&self) -> BattleStatus {
        if self.is_frozen() {
            self.status
        } else if self.attack_flag(AttackFlag::DataExfiltrated) {
            BattleStatus::AttackVictory
        } else if self.defense_flag(DefenseFlag::VulnerabilityPatched) {
            BattleStatus::DefenseVictory
        } else {
            BattleStatus::Ongoing
        }
    }

    /// Record a verdict and freeze. Returns false when nothing changed.
    pub fn resolve(&mut self, status: BattleStatus, at: DateTime<Utc>) -> bool {
        if self.is_frozen() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(at);
        true
    }

    /// Serialisable copy for external readers
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            stage_progress: self.stage_progress,
            overall_progress: self.stage_progress.overall(),
            attack_flags: self.attack_flags.clone(),
            defense_flags: self.defense_flags.clone(),
            compromised_assets: self.compromised_assets.iter().cloned().collect(),
            recovered_assets: self.recovered_assets.iter().cloned().collect(),
            blocked_ips: self.blocked_ips.iter().cloned().collect(),
            patched_vulnerabilities: self.patched_vulnerabilities.iter().cloned().collect(),
            defense_work_completed: self.defense_work_completed(),
            require_all_defense_actions: self.require_all_defense_actions,
        }
    }

    /// Summary for the closing report
    pub fn report(&self, now: DateTime<Utc>) -> BattleReport {
        let end = self.end_time.unwrap_or(now);
        let duration = (end - self.start_time).max(ChronoDuration::zero());
        BattleReport {
            duration_secs: duration.num_seconds(),
            duration: format!("{}m {}s", duration.num_minutes(), duration.num_seconds() % 60),
            attack_stages_completed: self.attack_flags.values().filter(|v| **v).count(),
            defense_actions_taken: self.defense_flags.values().filter(|v| **v).count(),
            compromised_assets: self.compromised_assets.iter().cloned().collect(),
            recovered_assets: self.recovered_assets.iter().cloned().collect(),
            blocked_ips: self.blocked_ips.iter().cloned().collect(),
            patched_vulnerabilities: self.patched_vulnerabilities.iter().cloned().collect(),
            final_result: self.status,
        }
    }
}

/// Immutable copy of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub status: BattleStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub stage_progress: StageProgress,
    pub overall_progress: f64,
    pub attack_flags: BTreeMap<AttackFlag, bool>,
    pub defense_flags: BTreeMap<DefenseFlag, bool>,
    pub compromised_assets: Vec<String>,
    pub recovered_assets: Vec<String>,
    pub blocked_ips: Vec<String>,
    pub patched_vulnerabilities: Vec<String>,
    pub defense_work_completed: bool,
    pub require_all_defense_actions: bool,
}

/// Closing summary emitted after the verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleReport {
    pub duration_secs: i64,
    pub duration: String,
    pub attack_stages_completed: usize,
    pub defense_actions_taken: usize,
    pub compromised_assets: Vec<String>,
    pub recovered_assets: Vec<String>,
    pub blocked_ips: Vec<String>,
    pub patched_vulnerabilities: Vec<String>,
    pub final_result: BattleStatus,
}
