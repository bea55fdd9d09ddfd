//! Request bodies for the defense endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::DispatchContext;
use super::rules::ResponseClass;

/// Network range handed to the blocking agent
pub const DEFAULT_TARGET_NETWORK: &str = "192.168.0.0/16";

/// Domain keyword → system name, first match wins
const SYSTEM_LOOKUP: &[(&[&str], &str)] = &[
    (&["database", "sql", " db", "records"], "database-server"),
    (&["mail", "phishing", "smtp", "inbox"], "mail-server"),
    (&["file", "share", "smb", "document"], "file-server"),
    (&["firewall", "perimeter", "gateway", "vpn"], "firewall"),
    (&["web", "http", "site", "portal"], "web-server"),
];

const FALLBACK_SYSTEM: &str = "web-server";

/// Class-specific request fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassFields {
    ThreatBlocking {
        target_network: String,
        threat_level: String,
        auto_block: bool,
    },
    VulnerabilityRemediation {
        target_systems: String,
        scan_type: String,
        auto_patch: bool,
        hardening_profile: String,
    },
    AttackAttribution {
        incident_id: String,
        attack_indicators: Vec<String>,
        source_node: String,
        target_node: String,
        evidence_types: Vec<String>,
    },
}

/// Complete request body: shared context plus class fields at the top level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub context: DispatchContext,
    #[serde(flatten)]
    pub fields: ClassFields,
}

/// Build the request body for `class`
pub fn build_payload(
    class: ResponseClass,
    context: &DispatchContext,
    now: DateTime<Utc>,
) -> DispatchPayload {
    let info = &context.extracted_info;
    let fields = match class {
        ResponseClass::ThreatBlocking => ClassFields::ThreatBlocking {
            target_network: DEFAULT_TARGET_NETWORK.to_string(),
            threat_level: threat_level(context).to_string(),
            auto_block: true,
        },
        ResponseClass::VulnerabilityRemediation => ClassFields::VulnerabilityRemediation {
            target_systems: info
                .hosts
                .first()
                .cloned()
                .unwrap_or_else(|| infer_system(&context.source_message).to_string()),
            scan_type: "comprehensive".to_string(),
            auto_patch: true,
            hardening_profile: "standard".to_string(),
        },
        ResponseClass::AttackAttribution => ClassFields::AttackAttribution {
            incident_id: format!("INC_{}", now.timestamp()),
            attack_indicators: info.ip_addresses.clone(),
            source_node: "internet".to_string(),
            target_node: info
                .hosts
                .first()
                .cloned()
                .unwrap_or_else(|| "internal_db".to_string()),
            evidence_types: vec!["logs".to_string(), "network".to_string()],
        },
    };
    DispatchPayload {
        context: context.clone(),
        fields,
    }
}

/// Infer the affected system from domain keywords in the message
pub fn infer_system(message: &str) -> &'static str {
    let lower = format!(" {}", message.to_lowercase());
    SYSTEM_LOOKUP
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(FALLBACK_SYSTEM, |(_, system)| system)
}

fn threat_level(context: &DispatchContext) -> &'static str {
    // Concrete indicators make the threat actionable right away.
    if context.extracted_info.ip_addresses.is_empty() {
        "high"
    } else {
        "critical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_threat_blocking_payload() {
        let ctx = DispatchContext::extract(
            "Attack Agent",
            "scan detected on firewall, malicious IP 192.168.100.11 found",
        );
        let json = serde_json::to_value(build_payload(ResponseClass::ThreatBlocking, &ctx, now()))
            .unwrap();
        assert_eq!(json["target_network"], DEFAULT_TARGET_NETWORK);
        assert_eq!(json["threat_level"], "critical");
        assert_eq!(json["auto_block"], true);
        assert_eq!(json["context"]["extracted_info"]["ip_addresses"][0], "192.168.100.11");
    }

    #[test]
    fn test_remediation_infers_system_without_host() {
        let ctx = DispatchContext::extract("Attack Agent", "SQL injection against customer records");
        let payload = build_payload(ResponseClass::VulnerabilityRemediation, &ctx, now());
        match payload.fields {
            ClassFields::VulnerabilityRemediation { target_systems, .. } => {
                assert_eq!(target_systems, "database-server")
            }
            other => panic!("unexpected fields: {other:?}"),
        }

        let ctx = DispatchContext::extract("Attack Agent", "attacker gained access to host web-01");
        let json = serde_json::to_value(build_payload(
            ResponseClass::VulnerabilityRemediation,
            &ctx,
            now(),
        ))
        .unwrap();
        assert_eq!(json["target_systems"], "web-01");
        assert_eq!(json["scan_type"], "comprehensive");
    }

    #[test]
    fn test_attribution_payload() {
        let ctx = DispatchContext::extract("Attack Agent", "data stolen via 10.0.0.7");
        let json =
            serde_json::to_value(build_payload(ResponseClass::AttackAttribution, &ctx, now()))
                .unwrap();
        assert_eq!(json["incident_id"], format!("INC_{}", now().timestamp()));
        assert_eq!(json["attack_indicators"][0], "10.0.0.7");
        assert_eq!(json["target_node"], "internal_db");
        assert_eq!(json["evidence_types"], serde_json::json!(["logs", "network"]));
    }

    #[test]
    fn test_infer_system_fallback() {
        assert_eq!(infer_system("phishing mail delivered"), "mail-server");
        assert_eq!(infer_system("something odd"), "web-server");
    }
}
