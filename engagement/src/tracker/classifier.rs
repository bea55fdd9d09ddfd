//! Attack step classification
//!
//! Two passes: canonical messages resolve through a fixed table, anything
//! else is scored against per-stage keyword sets.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::stages::{AttackStep, KillChainStage, StepStatus};

struct Canonical {
    message: &'static str,
    stage: KillChainStage,
    technique: &'static str,
    source_node: &'static str,
    target_node: &'static str,
    status: StepStatus,
    progress: u8,
}

const fn canonical(
    message: &'static str,
    stage: KillChainStage,
    technique: &'static str,
    nodes: (&'static str, &'static str),
    status: StepStatus,
    progress: u8,
) -> Canonical {
    Canonical {
        message,
        stage,
        technique,
        source_node: nodes.0,
        target_node: nodes.1,
        status,
        progress,
    }
}

use KillChainStage::*;
use StepStatus::*;

const ATTACKER_TO_FIREWALL: (&str, &str) = ("attacker", "firewall");
const ATTACKER_TO_HOST: (&str, &str) = ("attacker", "target_host");

/// Messages the attack agent emits verbatim
const CANONICAL_STEPS: &[Canonical] = &[
    canonical("attacker scans firewall", Reconnaissance, "network_scan", ATTACKER_TO_FIREWALL, InProgress, 30),
    canonical("attacker found open ports on firewall", Reconnaissance, "port_discovery", ATTACKER_TO_FIREWALL, InProgress, 60),
    canonical("attacker completed target reconnaissance", Reconnaissance, "reconnaissance", ATTACKER_TO_FIREWALL, Completed, 100),
    canonical("attacker crafts phishing email", Weaponization, "phishing_email", ("attacker", "attacker"), InProgress, 50),
    canonical("attacker completed malicious payload", Weaponization, "payload_crafting", ("attacker", "attacker"), Completed, 100),
    canonical("attacker sends phishing email to target", Delivery, "phishing_delivery", ATTACKER_TO_HOST, InProgress, 50),
    canonical("phishing email delivered to target", Delivery, "phishing_delivery", ATTACKER_TO_HOST, Completed, 100),
    canonical("target user clicked malicious link", Exploitation, "user_execution", ("target_host", "attacker"), InProgress, 40),
    canonical("attacker gained access to target host", Exploitation, "initial_access", ATTACKER_TO_HOST, Completed, 100),
    canonical("attacker installed backdoor on target host", Installation, "backdoor", ATTACKER_TO_HOST, InProgress, 60),
    canonical("attacker established persistence on target host", Installation, "persistence", ATTACKER_TO_HOST, Completed, 100),
    canonical("attacker established c2 channel with target host", CommandAndControl, "c2_channel", ATTACKER_TO_HOST, Completed, 100),
    canonical("attacker moved laterally to internal network", ActionsOnObjectives, "lateral_movement", ("target_host", "internal_network"), InProgress, 40),
    canonical("attacker exfiltrated data from internal database", ActionsOnObjectives, "data_exfiltration", ("internal_db", "attacker"), InProgress, 80),
    canonical("attacker fully compromised target system", ActionsOnObjectives, "full_compromise", ATTACKER_TO_HOST, Completed, 100),
];

static CANONICAL_INDEX: LazyLock<HashMap<&'static str, &'static Canonical>> =
    LazyLock::new(|| CANONICAL_STEPS.iter().map(|c| (c.message, c)).collect());

/// Per-stage keyword sets, in stage declaration order
const STAGE_KEYWORDS: &[(KillChainStage, &[&str])] = &[
    (Reconnaissance, &["scan", "nmap", "recon", "probe", "enumerat", "port", "discover", "fingerprint"]),
    (Weaponization, &["craft", "payload", "weaponiz", "generat", "build", "macro", "lure"]),
    (Delivery, &["send", "sent", "deliver", "email", "mail", "upload"]),
    (Exploitation, &["exploit", "click", "access", "vulnerab", "inject", "brute"]),
    (Installation, &["install", "backdoor", "persist", "implant", "malware"]),
    (CommandAndControl, &["c2", "command and control", "beacon", "remote control", "callback"]),
    (ActionsOnObjectives, &["exfiltrat", "steal", "stole", "lateral", "data", "compromise", "encrypt"]),
];

/// Status keyword sets, checked in this order
const STATUS_KEYWORDS: &[(StepStatus, &[&str])] = &[
    (Failed, &["fail", "error", "blocked", "denied", "unable"]),
    (Completed, &["complete", "finished", "success", "done", "established", "delivered", "gained"]),
    (Started, &["start", "begin", "initiat", "launch"]),
    (InProgress, &["progress", "running", "ongoing", "underway"]),
];

/// Classify an attacker message. `None` when no stage keyword appears.
pub fn classify(message: &str) -> Option<AttackStep> {
    let lower = message.trim().to_lowercase();
    if let Some(c) = CANONICAL_INDEX.get(lower.as_str()) {
        return Some(AttackStep {
            stage: c.stage,
            technique: c.technique.to_string(),
            source_node: c.source_node.to_string(),
            target_node: c.target_node.to_string(),
            status: c.status,
            progress: c.progress,
        });
    }

    let stage = score_stage(&lower)?;
    let status = infer_status(&lower);
    Some(AttackStep {
        stage,
        technique: default_technique(stage).to_string(),
        source_node: "attacker".to_string(),
        target_node: default_target(stage).to_string(),
        status,
        progress: status.default_progress(),
    })
}

/// Highest keyword count wins; ties go to the earlier stage.
fn score_stage(lower: &str) -> Option<KillChainStage> {
    let mut best: Option<(KillChainStage, usize)> = None;
    for (stage, keywords) in STAGE_KEYWORDS {
        let score: usize = keywords.iter().map(|k| lower.matches(k).count()).sum();
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((*stage, score));
        }
    }
    best.map(|(stage, _)| stage)
}

fn infer_status(lower: &str) -> StepStatus {
    STATUS_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(InProgress, |(status, _)| *status)
}

fn default_technique(stage: KillChainStage) -> &'static str {
    match stage {
        Reconnaissance => "network_scan",
        Weaponization => "payload_crafting",
        Delivery => "phishing_delivery",
        Exploitation => "initial_access",
        Installation => "persistence",
        CommandAndControl => "c2_channel",
        ActionsOnObjectives => "data_exfiltration",
    }
}

fn default_target(stage: KillChainStage) -> &'static str {
    match stage {
        Reconnaissance => "firewall",
        Weaponization => "attacker",
        ActionsOnObjectives => "internal_db",
        _ => "target_host",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_messages_resolve_exactly() {
        let step = classify("Attacker scans firewall").unwrap();
        assert_eq!(step.stage, Reconnaissance);
        assert_eq!(step.technique, "network_scan");
        assert_eq!(step.target_node, "firewall");
        assert_eq!(step.progress, 30);

        let step = classify("attacker established c2 channel with target host").unwrap();
        assert_eq!(step.stage, CommandAndControl);
        assert_eq!(step.status, Completed);
        assert_eq!(step.progress, 100);
    }

    #[test]
    fn test_every_canonical_entry_is_reachable() {
        for c in CANONICAL_STEPS {
            let step = classify(c.message).unwrap();
            assert_eq!(step.stage, c.stage, "{}", c.message);
            assert_eq!(step.progress, c.progress, "{}", c.message);
        }
    }

    #[test]
    fn test_keyword_fallback() {
        let step = classify("running nmap against the dmz").unwrap();
        assert_eq!(step.stage, Reconnaissance);
        assert_eq!(step.status, InProgress);
        assert_eq!(step.progress, 50);

        let step = classify("Starting to install malware implant").unwrap();
        assert_eq!(step.stage, Installation);
        assert_eq!(step.status, Started);
        assert_eq!(step.progress, 10);

        let step = classify("data theft failed, exfiltration channel blocked").unwrap();
        assert_eq!(step.stage, ActionsOnObjectives);
        assert_eq!(step.status, Failed);
        assert_eq!(step.progress, 0);
    }

    #[test]
    fn test_ties_go_to_earlier_stage() {
        // One reconnaissance hit, one delivery hit.
        let step = classify("scan then deliver").unwrap();
        assert_eq!(step.stage, Reconnaissance);
    }

    #[test]
    fn test_no_keyword_is_unclassified() {
        assert!(classify("agent idle").is_none());
        assert!(classify("").is_none());
    }
}
