//! Kill-chain taxonomy and per-stage progress

use std::collections::HashMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The seven canonical attacker phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillChainStage {
    Reconnaissance,
    Weaponization,
    Delivery,
    Exploitation,
    Installation,
    CommandAndControl,
    ActionsOnObjectives,
}

impl KillChainStage {
    /// All stages in declaration order
    pub const ALL: [KillChainStage; 7] = [
        Self::Reconnaissance,
        Self::Weaponization,
        Self::Delivery,
        Self::Exploitation,
        Self::Installation,
        Self::CommandAndControl,
        Self::ActionsOnObjectives,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reconnaissance => "reconnaissance",
            Self::Weaponization => "weaponization",
            Self::Delivery => "delivery",
            Self::Exploitation => "exploitation",
            Self::Installation => "installation",
            Self::CommandAndControl => "command_and_control",
            Self::ActionsOnObjectives => "actions_on_objectives",
        }
    }
}

impl fmt::Display for KillChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one attack step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    /// Progress recorded when only the status is known
    pub fn default_progress(self) -> u8 {
        match self {
            Self::Started => 10,
            Self::InProgress => 50,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }
}

/// Canonical reading of one attacker event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackStep {
    pub stage: KillChainStage,
    pub technique: String,
    pub source_node: String,
    pub target_node: String,
    pub status: StepStatus,
    pub progress: u8,
}

/// Progress percent per stage; serialises as a `stage -> percent` map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageProgress([u8; 7]);

impl StageProgress {
    pub fn get(&self, stage: KillChainStage) -> u8 {
        self.0[stage.index()]
    }

    /// Overwrite a stage's progress, returning the previous value
    pub fn set(&mut self, stage: KillChainStage, percent: u8) -> u8 {
        let previous = self.0[stage.index()];
        self.0[stage.index()] = percent.min(100);
        previous
    }

    /// Arithmetic mean across all seven stages
    pub fn overall(&self) -> f64 {
        self.0.iter().map(|p| *p as f64).sum::<f64>() / self.0.len() as f64
    }

    /// Stages at 100%
    pub fn completed(&self) -> Vec<KillChainStage> {
        KillChainStage::ALL
            .into_iter()
            .filter(|stage| self.get(*stage) >= 100)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KillChainStage, u8)> + '_ {
        KillChainStage::ALL.into_iter().map(|stage| (stage, self.get(stage)))
    }
}

impl Serialize for StageProgress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(7))?;
        for (stage, percent) in self.iter() {
            map.serialize_entry(stage.as_str(), &percent)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StageProgress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = HashMap::<KillChainStage, u8>::deserialize(deserializer)?;
        let mut progress = StageProgress::default();
        for (stage, percent) in map {
            progress.set(stage, percent);
        }
        Ok(progress)
    }
}
