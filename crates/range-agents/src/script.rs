//! Scripted kill-chain replay

use std::time::Duration;

use engagement::{CascadePlan, Event, Level};

/// The attacker's script, one bus event per step, in kill-chain order
pub const KILL_CHAIN: &[(Level, &str)] = &[
    (Level::Info, "attacker scans firewall"),
    (Level::Info, "attacker found open ports on firewall"),
    (Level::Success, "attacker completed target reconnaissance"),
    (Level::Info, "attacker crafts phishing email"),
    (Level::Success, "attacker completed malicious payload"),
    (Level::Info, "attacker sends phishing email to target"),
    (Level::Success, "phishing email delivered to target"),
    (Level::Warning, "target user clicked malicious link"),
    (Level::Warning, "attacker gained access to target host"),
    (Level::Warning, "attacker installed backdoor on target host"),
    (Level::Warning, "attacker established persistence on target host"),
    (Level::Warning, "attacker established c2 channel with target host"),
    (Level::Warning, "attacker moved laterally to internal network"),
    (Level::Critical, "attacker exfiltrated data from internal database"),
    (Level::Critical, "attacker fully compromised target system"),
];

/// Build the replay plan: the first step fires immediately, every later one
/// `pace` after its predecessor.
pub fn kill_chain_plan(identity: &str, pace: Duration) -> CascadePlan {
    KILL_CHAIN
        .iter()
        .enumerate()
        .fold(CascadePlan::new(), |plan, (i, (level, message))| {
            let delay = if i == 0 { Duration::ZERO } else { pace };
            plan.then(delay, Event::new(*level, identity, *message))
        })
}
