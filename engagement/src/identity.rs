//! Agent identities and source-based role resolution.
//!
//! Every component decides what to do with an event by looking at who sent
//! it. Sources are matched case-insensitively by substring, so
//! `"Attack Agent #2"` still resolves to the attacker role.

use serde::{Deserialize, Serialize};

use crate::dispatch::ResponseClass;

/// The role behind an event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Producer on the attacking side.
    Attacker,
    /// One of the three defense agents.
    Defense(ResponseClass),
    /// The dispatch engine itself.
    Dispatcher,
    /// The victory arbiter.
    Arbiter,
    /// The progress tracker's stage notifications.
    Tracker,
    /// Bus-generated events (welcome messages).
    Bus,
    /// Anything else (UI, operators, unknown agents).
    Unknown,
}

impl Role {
    /// Internal orchestrator components whose events must never feed back
    /// into dispatch or arbitration as agent activity.
    pub fn is_internal(self) -> bool {
        matches!(self, Self::Dispatcher | Self::Arbiter | Self::Tracker | Self::Bus)
    }
}

/// Source names used by every party on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentIdentities {
    /// Source names that identify attacker-side producers.
    pub attackers: Vec<String>,
    pub threat_blocking: String,
    pub vulnerability_remediation: String,
    pub attack_attribution: String,
    pub dispatcher: String,
    pub arbiter: String,
    pub tracker: String,
    pub bus: String,
}

impl Default for AgentIdentities {
    fn default() -> Self {
        Self {
            attackers: vec!["Attack Agent".to_string()],
            threat_blocking: "Threat Blocking Agent".to_string(),
            vulnerability_remediation: "Vulnerability Remediation Agent".to_string(),
            attack_attribution: "Attack Attribution Agent".to_string(),
            dispatcher: "Defense Coordinator".to_string(),
            arbiter: "Battle Judge".to_string(),
            tracker: "Progress Tracker".to_string(),
            bus: "Event Bus".to_string(),
        }
    }
}

impl AgentIdentities {
    /// Source name of the defense agent backing a response class
    pub fn defense_identity(&self, class: ResponseClass) -> &str {
        match class {
            ResponseClass::ThreatBlocking => &self.threat_blocking,
            ResponseClass::VulnerabilityRemediation => &self.vulnerability_remediation,
            ResponseClass::AttackAttribution => &self.attack_attribution,
        }
    }

    /// Resolve the role behind an event source.
    ///
    /// Internal identities are checked first, then defense agents, then
    /// attackers.
    pub fn role_of(&self, source: &str) -> Role {
        let source = source.to_lowercase();
        let names = |name: &str| !name.is_empty() && source.contains(&name.to_lowercase());

        if names(&self.arbiter) {
            return Role::Arbiter;
        }
        if names(&self.dispatcher) {
            return Role::Dispatcher;
        }
        if names(&self.tracker) {
            return Role::Tracker;
        }
        if names(&self.bus) {
            return Role::Bus;
        }
        for class in ResponseClass::ALL {
            if names(self.defense_identity(class)) {
                return Role::Defense(class);
            }
        }
        if self.attackers.iter().any(|a| names(a)) {
            return Role::Attacker;
        }
        Role::Unknown
    }
}
