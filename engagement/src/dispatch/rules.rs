//! Response classes and the trigger rule table
//!
//! Rules are an ordered table of `(class, pattern)` rows evaluated once per
//! message. A message may match zero, one or several classes; the result is
//! always returned in priority order.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Defense response categories the dispatcher can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseClass {
    ThreatBlocking,
    VulnerabilityRemediation,
    AttackAttribution,
}

impl ResponseClass {
    /// All classes in priority order
    pub const ALL: [ResponseClass; 3] = [
        Self::ThreatBlocking,
        Self::VulnerabilityRemediation,
        Self::AttackAttribution,
    ];

    /// Priority rank, 1 is dispatched first
    pub fn priority(self) -> u8 {
        match self {
            Self::ThreatBlocking => 1,
            Self::VulnerabilityRemediation => 2,
            Self::AttackAttribution => 3,
        }
    }

    /// Default minimum interval between two triggers of this class
    pub fn default_interval(self) -> Duration {
        match self {
            Self::ThreatBlocking => Duration::from_secs(5),
            Self::VulnerabilityRemediation => Duration::from_secs(15),
            Self::AttackAttribution => Duration::from_secs(30),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreatBlocking => "threat_blocking",
            Self::VulnerabilityRemediation => "vulnerability_remediation",
            Self::AttackAttribution => "attack_attribution",
        }
    }
}

impl fmt::Display for ResponseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the trigger table
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub class: ResponseClass,
    pub pattern: Regex,
}

/// Default trigger patterns, in declaration order per class.
const DEFAULT_PATTERNS: &[(ResponseClass, &str)] = &[
    // Reconnaissance and early intrusion: block at the perimeter
    (ResponseClass::ThreatBlocking, r"attacker.*scan.*firewall"),
    (ResponseClass::ThreatBlocking, r"scan.*detected|detected.*port.?scan"),
    (ResponseClass::ThreatBlocking, r"(found|discovered).*open.*port"),
    (ResponseClass::ThreatBlocking, r"attacker.*send.*phishing"),
    (ResponseClass::ThreatBlocking, r"malicious.*\bip\b"),
    (ResponseClass::ThreatBlocking, r"detected.*brute.?force"),
    (ResponseClass::ThreatBlocking, r"malicious.*domain"),
    (ResponseClass::ThreatBlocking, r"attacker.*establish.*c2"),
    (ResponseClass::ThreatBlocking, r"detected.*data.*exfiltration"),
    // Footholds: patch and harden
    (ResponseClass::VulnerabilityRemediation, r"vulnerability.*exploited"),
    (ResponseClass::VulnerabilityRemediation, r"attacker.*(gain|obtain).*access"),
    (ResponseClass::VulnerabilityRemediation, r"system.*compromised"),
    (ResponseClass::VulnerabilityRemediation, r"found.*security.*vulnerabilit"),
    (ResponseClass::VulnerabilityRemediation, r"patch.*(needs|required|update)"),
    (ResponseClass::VulnerabilityRemediation, r"attacker.*install.*backdoor"),
    (ResponseClass::VulnerabilityRemediation, r"configuration.*(flaw|weakness|defect)"),
    (ResponseClass::VulnerabilityRemediation, r"system.*needs.*hardening"),
    // Late-stage or completed attacks: trace and collect evidence
    (ResponseClass::AttackAttribution, r"attack.*complete"),
    (ResponseClass::AttackAttribution, r"attacker.*fully.*compromise"),
    (ResponseClass::AttackAttribution, r"data.*(stolen|exfiltrat)|exfiltrat\w*.*data"),
    (ResponseClass::AttackAttribution, r"attack.*succe"),
    (ResponseClass::AttackAttribution, r"(needs|requires).*trac(e|ing)"),
    (ResponseClass::AttackAttribution, r"attack.*path.*analysis"),
    (ResponseClass::AttackAttribution, r"threat.*attribution"),
    (ResponseClass::AttackAttribution, r"collect.*evidence"),
];

static DEFAULT_RULES: LazyLock<RuleTable> = LazyLock::new(|| {
    RuleTable::from_patterns(DEFAULT_PATTERNS).expect("default trigger patterns should compile")
});

/// Ordered, case-insensitive trigger table
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<TriggerRule>,
}

impl RuleTable {
    /// Build a table from `(class, pattern)` rows
    pub fn from_patterns(rows: &[(ResponseClass, &str)]) -> Result<Self, regex::Error> {
        let rules = rows
            .iter()
            .map(|(class, pattern)| {
                Ok(TriggerRule {
                    class: *class,
                    pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// Shared default table
    pub fn defaults() -> &'static RuleTable {
        &DEFAULT_RULES
    }

    /// Classes matched by `message`, sorted by priority
    pub fn classify(&self, message: &str) -> Vec<ResponseClass> {
        let mut matched: Vec<ResponseClass> = Vec::new();
        for rule in &self.rules {
            if !matched.contains(&rule.class) && rule.pattern.is_match(message) {
                matched.push(rule.class);
            }
        }
        matched.sort_by_key(|class| class.priority());
        matched
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}
