//! Context extraction from free-text event messages
//!
//! The helpers here are shared with the arbiter, which mines defense
//! messages for blocked IPs, patched CVEs and recovered hosts.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap());

static HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:host|server|device|node)\s+([A-Za-z0-9][\w.\-]*)").unwrap()
});

static CVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bCVE-\d{4}-\d{4,}\b").unwrap());

/// "vulnerability X" where X looks like an identifier (has a digit or dash)
static NAMED_VULNERABILITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bvulnerability\s+([\w.]*[\d\-][\w.\-]*)").unwrap()
});

static ATTACK_TECHNIQUES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("phishing", r"(?i)phishing"),
        ("brute-force", r"(?i)brute.?force"),
        ("port-scan", r"(?i)port.?scan"),
        ("sql-injection", r"(?i)sql.?injection"),
        ("remote-code-execution", r"(?i)remote.?code.?execution"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

/// Indicators pulled out of one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedInfo {
    pub ip_addresses: Vec<String>,
    pub hosts: Vec<String>,
    pub vulnerabilities: Vec<String>,
    pub attack_types: Vec<String>,
}

impl ExtractedInfo {
    pub fn from_message(message: &str) -> Self {
        Self {
            ip_addresses: extract_ipv4s(message),
            hosts: extract_hosts(message),
            vulnerabilities: extract_vulnerabilities(message),
            attack_types: extract_attack_types(message),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ip_addresses.is_empty()
            && self.hosts.is_empty()
            && self.vulnerabilities.is_empty()
            && self.attack_types.is_empty()
    }
}

/// Shared context bundle sent with every dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchContext {
    pub source_message: String,
    pub log_source: String,
    pub extracted_info: ExtractedInfo,
}

impl DispatchContext {
    pub fn extract(source: &str, message: &str) -> Self {
        Self {
            source_message: message.to_string(),
            log_source: source.to_string(),
            extracted_info: ExtractedInfo::from_message(message),
        }
    }
}

/// Valid dotted-quad IPv4 addresses, first occurrence order
pub fn extract_ipv4s(message: &str) -> Vec<String> {
    unique(
        IPV4.find_iter(message)
            .map(|m| m.as_str())
            .filter(|candidate| candidate.parse::<Ipv4Addr>().is_ok())
            .map(str::to_string),
    )
}

/// Names following "host", "server", "device" or "node"
pub fn extract_hosts(message: &str) -> Vec<String> {
    unique(
        HOST.captures_iter(message)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
            .filter(|host| !host.is_empty()),
    )
}

/// CVE identifiers, uppercased
pub fn extract_cves(message: &str) -> Vec<String> {
    unique(CVE.find_iter(message).map(|m| m.as_str().to_uppercase()))
}

/// CVE identifiers, or "vulnerability X" names when no CVE is present
pub fn extract_vulnerabilities(message: &str) -> Vec<String> {
    let cves = extract_cves(message);
    if !cves.is_empty() {
        return cves;
    }
    unique(
        NAMED_VULNERABILITY
            .captures_iter(message)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string()),
    )
}

/// Canonical technique names mentioned in the message
pub fn extract_attack_types(message: &str) -> Vec<String> {
    ATTACK_TECHNIQUES
        .iter()
        .filter(|(_, re)| re.is_match(message))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
