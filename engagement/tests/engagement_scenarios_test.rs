//! End-to-end engagement scenarios — arbiter verdicts, trigger dedup and
//! defense feedback isolation.
//!
//! Scenarios:
//! 1. Exfiltration plus the four core defense actions → attack victory
//! 2. Four core defense actions, no exfiltration → defense victory
//! 3. Exfiltration without a patch → still ongoing
//! 4. Deadline passed with exfiltration → attack victory by fallback
//! 5. Repeated scan report within 3 s → one threat-blocking call
//! 6. Defense-originated events never trigger dispatch

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use common::{attacker, CollectingSink, RecordingClient};
use engagement::arbiter::{ArbiterSettings, BATTLE_REPORT_KEY};
use engagement::dispatch::{DispatchOutcome, DispatchSettings, IgnoreReason};
use engagement::{
    AgentIdentities, BattleStatus, DispatchEngine, Event, Level, ResponseClass, VictoryArbiter,
};

fn arbiter() -> VictoryArbiter {
    VictoryArbiter::new(AgentIdentities::default(), ArbiterSettings::default())
}

fn core_defense_feed() -> Vec<Event> {
    vec![
        Event::success("Threat Blocking Agent", "Threat detected on firewall"),
        Event::success("Threat Blocking Agent", "Successfully blocked malicious IP 192.168.100.11"),
        Event::success("Vulnerability Remediation Agent", "Patched CVE-2024-3094 on server web-01"),
        Event::success("Attack Attribution Agent", "Attack path traced to 203.0.113.40"),
    ]
}

// ── Arbiter scenarios ──────────────────────────────────────────────

#[test]
fn scenario_1_exfiltration_with_core_defense_is_attack_victory() {
    let mut arbiter = arbiter();
    let sink = CollectingSink::default();
    let now = Utc::now();

    arbiter.observe_at(&attacker("attacker exfiltrated data from internal database"), now, &sink);
    let mut verdict = None;
    for event in core_defense_feed() {
        verdict = verdict.or(arbiter.observe_at(&event, now, &sink));
    }

    assert_eq!(verdict, Some(BattleStatus::AttackVictory));
    let events = sink.events();
    let verdict_event = events
        .iter()
        .find(|e| e.message == "Engagement over: attack victory")
        .unwrap();
    assert_eq!(verdict_event.level, Level::Critical);
    assert!(events.last().unwrap().extension(BATTLE_REPORT_KEY).is_some());
}

#[test]
fn scenario_2_core_defense_without_exfiltration_is_defense_victory() {
    let mut arbiter = arbiter();
    let sink = CollectingSink::default();
    let now = Utc::now();

    arbiter.observe_at(&attacker("attacker gained access to target host web-01"), now, &sink);
    for event in core_defense_feed() {
        arbiter.observe_at(&event, now, &sink);
    }

    assert_eq!(arbiter.status(), BattleStatus::DefenseVictory);
    let snapshot = arbiter.ledger().unwrap().snapshot();
    assert_eq!(snapshot.compromised_assets, vec!["web-01"]);
    assert_eq!(snapshot.blocked_ips, vec!["192.168.100.11"]);
    assert_eq!(snapshot.patched_vulnerabilities, vec!["CVE-2024-3094"]);
    assert!(snapshot.end_time.is_some());
}

#[test]
fn scenario_3_exfiltration_without_patch_stays_ongoing() {
    let mut arbiter = arbiter();
    let sink = CollectingSink::default();
    let now = Utc::now();

    arbiter.observe_at(&attacker("attacker exfiltrated data from internal database"), now, &sink);
    for event in core_defense_feed()
        .into_iter()
        .filter(|e| e.source != "Vulnerability Remediation Agent")
    {
        arbiter.observe_at(&event, now, &sink);
    }

    assert_eq!(arbiter.status(), BattleStatus::Ongoing);
    assert!(!sink.messages().iter().any(|m| m.contains("victory")));
}

#[test]
fn scenario_4_deadline_fallback_awards_exfiltration() {
    let mut arbiter = arbiter();
    let sink = CollectingSink::default();
    let start = Utc::now();

    arbiter.observe_at(&attacker("attacker exfiltrated data from internal database"), start, &sink);
    assert_eq!(
        arbiter.check_timeout(start + ChronoDuration::minutes(16), &sink),
        Some(BattleStatus::AttackVictory)
    );
    let report = sink.events().last().unwrap().extension(BATTLE_REPORT_KEY).cloned().unwrap();
    assert_eq!(report["final_result"], "attack_victory");
    assert_eq!(report["duration"], "16m 0s");
}

#[test]
fn victory_is_terminal() {
    let mut arbiter = arbiter();
    let sink = CollectingSink::default();
    let now = Utc::now();

    arbiter.observe_at(&attacker("attacker scans firewall"), now, &sink);
    for event in core_defense_feed() {
        arbiter.observe_at(&event, now, &sink);
    }
    assert_eq!(arbiter.status(), BattleStatus::DefenseVictory);

    // Later exfiltration and timeouts cannot flip the outcome.
    arbiter.observe_at(&attacker("attacker exfiltrated data from internal database"), now, &sink);
    arbiter.check_timeout(now + ChronoDuration::hours(1), &sink);
    assert_eq!(arbiter.status(), BattleStatus::DefenseVictory);
    assert_eq!(
        sink.messages().iter().filter(|m| m.starts_with("Engagement over")).count(),
        1
    );
}

#[test]
fn strict_mode_waits_for_all_six_actions() {
    let mut arbiter = VictoryArbiter::new(
        AgentIdentities::default(),
        ArbiterSettings {
            require_all_defense_actions: true,
            ..Default::default()
        },
    );
    let sink = CollectingSink::default();
    let now = Utc::now();

    arbiter.observe_at(&attacker("attacker scans firewall"), now, &sink);
    for event in core_defense_feed() {
        arbiter.observe_at(&event, now, &sink);
    }
    assert_eq!(arbiter.status(), BattleStatus::Ongoing);

    arbiter.observe_at(
        &Event::success("Vulnerability Remediation Agent", "Recovered host web-01 and hardened it"),
        now,
        &sink,
    );
    arbiter.observe_at(
        &Event::success("Attack Attribution Agent", "Evidence collected, report filed"),
        now,
        &sink,
    );
    assert_eq!(arbiter.status(), BattleStatus::DefenseVictory);
}

// ── Dispatch scenarios ─────────────────────────────────────────────

fn engine(client: std::sync::Arc<RecordingClient>) -> DispatchEngine {
    DispatchEngine::new(AgentIdentities::default(), DispatchSettings::default(), client)
}

#[tokio::test(start_paused = true)]
async fn scenario_5_repeated_scan_report_dispatches_once() {
    let client = RecordingClient::shared();
    let mut engine = engine(client.clone());
    let sink = CollectingSink::default();
    let message = "scan detected on firewall, malicious IP 192.168.100.11 found";

    let first = engine.handle(&attacker(message), &sink).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    let second = engine.handle(&attacker(message), &sink).await;

    match first {
        DispatchOutcome::Triggered { context, .. } => {
            assert_eq!(context.extracted_info.ip_addresses, vec!["192.168.100.11"]);
        }
        other => panic!("expected a trigger, got {other:?}"),
    }
    assert!(matches!(second, DispatchOutcome::Duplicate(_)));

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ResponseClass::ThreatBlocking);
}

#[tokio::test(start_paused = true)]
async fn scenario_6_defense_events_never_trigger_dispatch() {
    let client = RecordingClient::shared();
    let mut engine = engine(client.clone());
    let sink = CollectingSink::default();

    let echoes = [
        Event::success("Threat Blocking Agent", "Blocked malicious IP 10.0.0.1 after port scan detected"),
        Event::success("Vulnerability Remediation Agent", "System compromised earlier, patch required and applied"),
        Event::success("Attack Attribution Agent", "Attack complete: data stolen, collect evidence"),
        Event::info("Defense Coordinator", "Attack activity detected, preparing defense response"),
        Event::info("Progress Tracker", "Stage actions_on_objectives at 80% (data_exfiltration)"),
    ];
    for event in &echoes {
        assert!(
            matches!(
                engine.handle(event, &sink).await,
                DispatchOutcome::Ignored(IgnoreReason::NotAttacker | IgnoreReason::Internal)
            ),
            "{}",
            event.source
        );
    }
    assert!(client.calls().is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn verdict_stops_dispatch_for_good() {
    let client = RecordingClient::shared();
    let mut engine = engine(client.clone());
    let sink = CollectingSink::default();

    let verdict = Event::success("Battle Judge", "Engagement over: defense victory");
    assert_eq!(engine.handle(&verdict, &sink).await, DispatchOutcome::Halted);
    assert_eq!(
        engine
            .handle(&attacker("attacker gained access to target host web-01"), &sink)
            .await,
        DispatchOutcome::Ignored(IgnoreReason::Stopped)
    );
    assert!(client.calls().is_empty());
    assert!(engine.snapshot().stopped);
}
