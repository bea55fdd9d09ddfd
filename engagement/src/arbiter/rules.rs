//! Arbitration rule tables
//!
//! Each row maps a message pattern to ledger flags plus an optional asset
//! harvest. Every matching row is applied, so a message that reports two
//! facts sets both flags.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use super::ledger::{AssetSet, AttackFlag, BattleLedger, DefenseFlag};
use crate::dispatch::{extract_cves, extract_hosts, extract_ipv4s, ResponseClass};

/// Values pulled from a matching message into an asset set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Harvest {
    Nothing,
    CompromisedHosts,
    RecoveredHosts,
    BlockedIps,
    PatchedCves,
}

impl Harvest {
    fn apply(self, ledger: &mut BattleLedger, message: &str) -> bool {
        let (set, values) = match self {
            Self::Nothing => return false,
            Self::CompromisedHosts => (AssetSet::Compromised, extract_hosts(message)),
            Self::RecoveredHosts => (AssetSet::Recovered, extract_hosts(message)),
            Self::BlockedIps => (AssetSet::BlockedIps, extract_ipv4s(message)),
            Self::PatchedCves => (AssetSet::PatchedVulnerabilities, extract_cves(message)),
        };
        values
            .into_iter()
            .fold(false, |changed, value| ledger.record_asset(set, value) || changed)
    }
}

struct AttackRule {
    pattern: Regex,
    flags: &'static [AttackFlag],
    harvest: Harvest,
}

struct DefenseRule {
    class: ResponseClass,
    pattern: Regex,
    flag: DefenseFlag,
    harvest: Harvest,
}

fn pattern(source: &str) -> Regex {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .expect("arbitration pattern should compile")
}

static ATTACK_RULES: LazyLock<Vec<AttackRule>> = LazyLock::new(|| {
    use AttackFlag::*;
    let row = |source: &str, flags: &'static [AttackFlag], harvest: Harvest| AttackRule {
        pattern: pattern(source),
        flags,
        harvest,
    };
    vec![
        row(r"completed target reconnaissance|reconnaissance (phase )?complete", &[Reconnaissance], Harvest::Nothing),
        row(r"completed malicious payload|weaponi[sz]ation (phase )?complete", &[Weaponization], Harvest::Nothing),
        row(r"phishing email delivered|delivery (phase )?complete", &[Delivery], Harvest::Nothing),
        row(
            r"gained access to|vulnerability exploited|exploitation (phase )?complete",
            &[Exploitation],
            Harvest::CompromisedHosts,
        ),
        row(r"established persistence|installation (phase )?complete", &[Installation], Harvest::Nothing),
        row(r"established c2|command and control (channel )?established|c2 (phase )?complete", &[CommandAndControl], Harvest::Nothing),
        row(
            r"exfiltrated data|data (stolen|exfiltrated)|data theft complete",
            &[ActionsOnObjectives, DataExfiltrated],
            Harvest::Nothing,
        ),
    ]
});

static DEFENSE_RULES: LazyLock<Vec<DefenseRule>> = LazyLock::new(|| {
    use DefenseFlag::*;
    use ResponseClass::*;
    let row = |class, source: &str, flag, harvest| DefenseRule {
        class,
        pattern: pattern(source),
        flag,
        harvest,
    };
    vec![
        row(ThreatBlocking, r"\b(detect|discover|found|identified)", ThreatDetected, Harvest::Nothing),
        row(ThreatBlocking, r"\bblock|\bblacklist|\bblocklist", IpBlocked, Harvest::BlockedIps),
        row(VulnerabilityRemediation, r"\bpatch|\bremediat|\bfixed\b", VulnerabilityPatched, Harvest::PatchedCves),
        row(VulnerabilityRemediation, r"\brecover|\brestor|\bharden", SystemRecovered, Harvest::RecoveredHosts),
        row(AttackAttribution, r"\btrac(e|ed|ing)\b|\battribut|\banaly[sz]", AttackTraced, Harvest::Nothing),
        row(AttackAttribution, r"\bevidence|\breport", EvidenceCollected, Harvest::Nothing),
    ]
});

/// Apply every matching attack rule. Returns true when the ledger changed.
pub fn apply_attack(ledger: &mut BattleLedger, message: &str) -> bool {
    let mut changed = false;
    for rule in ATTACK_RULES.iter().filter(|rule| rule.pattern.is_match(message)) {
        for flag in rule.flags {
            changed |= ledger.set_attack_flag(*flag);
        }
        changed |= rule.harvest.apply(ledger, message);
    }
    changed
}

/// Apply every matching rule for the reporting defense agent's class
pub fn apply_defense(ledger: &mut BattleLedger, class: ResponseClass, message: &str) -> bool {
    let mut changed = false;
    for rule in DEFENSE_RULES
        .iter()
        .filter(|rule| rule.class == class && rule.pattern.is_match(message))
    {
        changed |= ledger.set_defense_flag(rule.flag);
        changed |= rule.harvest.apply(ledger, message);
    }
    changed
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn ledger() -> BattleLedger {
        BattleLedger::new(Utc::now())
    }

    #[test]
    fn test_exfiltration_sets_both_flags() {
        let mut ledger = ledger();
        assert!(apply_attack(&mut ledger, "Attacker exfiltrated data from internal database"));
        assert!(ledger.attack_flag(AttackFlag::ActionsOnObjectives));
        assert!(ledger.attack_flag(AttackFlag::DataExfiltrated));
        // Idempotent
        assert!(!apply_attack(&mut ledger, "attacker exfiltrated data from internal database"));
    }

    #[test]
    fn test_exploitation_harvests_compromised_hosts() {
        let mut ledger = ledger();
        apply_attack(&mut ledger, "attacker gained access to target host web-01");
        assert!(ledger.attack_flag(AttackFlag::Exploitation));
        assert_eq!(ledger.snapshot().compromised_assets, vec!["web-01"]);
    }

    #[test]
    fn test_in_progress_messages_set_nothing() {
        let mut ledger = ledger();
        assert!(!apply_attack(&mut ledger, "attacker scans firewall"));
        assert!(!apply_attack(&mut ledger, "attacker crafts phishing email"));
    }

    #[test]
    fn test_defense_rules_are_keyed_by_class() {
        let mut ledger = ledger();
        // Blocking language from the wrong agent does nothing.
        assert!(!apply_defense(
            &mut ledger,
            ResponseClass::AttackAttribution,
            "Blocked malicious IP 10.1.1.1"
        ));
        assert!(apply_defense(
            &mut ledger,
            ResponseClass::ThreatBlocking,
            "Detected threat, blocked malicious IP 10.1.1.1"
        ));
        assert!(ledger.defense_flag(DefenseFlag::ThreatDetected));
        assert!(ledger.defense_flag(DefenseFlag::IpBlocked));
        assert_eq!(ledger.snapshot().blocked_ips, vec!["10.1.1.1"]);
    }

    #[test]
    fn test_remediation_harvests() {
        let mut ledger = ledger();
        apply_defense(
            &mut ledger,
            ResponseClass::VulnerabilityRemediation,
            "Patched cve-2024-1234 on server db-02",
        );
        apply_defense(
            &mut ledger,
            ResponseClass::VulnerabilityRemediation,
            "Recovered host web-01",
        );
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.patched_vulnerabilities, vec!["CVE-2024-1234"]);
        assert_eq!(snapshot.recovered_assets, vec!["web-01"]);
        assert!(ledger.defense_flag(DefenseFlag::SystemRecovered));
    }

    #[test]
    fn test_attribution_rules() {
        let mut ledger = ledger();
        apply_defense(&mut ledger, ResponseClass::AttackAttribution, "Attack path traced to 203.0.113.5");
        apply_defense(&mut ledger, ResponseClass::AttackAttribution, "Evidence collected and archived");
        assert!(ledger.defense_flag(DefenseFlag::AttackTraced));
        assert!(ledger.defense_flag(DefenseFlag::EvidenceCollected));
    }
}
