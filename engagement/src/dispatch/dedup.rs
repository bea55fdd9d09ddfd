//! Duplicate suppression for dispatch triggers
//!
//! Every event yields two fingerprints: an exact one over `source` and
//! `message`, and a semantic one over `source` plus a handful of concept
//! flags, so reworded repeats of the same observation also collapse.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

/// Default exact-content TTL
pub const DEFAULT_EXACT_TTL: Duration = Duration::from_secs(5);

/// Default semantic TTL
pub const DEFAULT_SEMANTIC_TTL: Duration = Duration::from_secs(10);

/// Action-verb classes, first match wins. Index + 1 is the flag value.
static VERB_CLASSES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(scan|prob(e|ing)|enumerat|discover|detect|found)",
        r"(?i)\b(send|sent|deliver|phish|email)",
        r"(?i)\b(exploit|gain|compromis|inject|brute)",
        r"(?i)\b(install|backdoor|persist)",
        r"(?i)\b(c2|beacon|command|establish)",
        r"(?i)\b(exfiltrat|steal|stole|stolen|transfer)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static IPV4_PRESENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap());

static HOST_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(host|server|firewall|database|workstation|node|device)").unwrap()
});

static PHASE_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(reconnaissance|weaponization|delivery|exploitation|installation|command and control|exfiltration)",
    )
    .unwrap()
});

/// Presence flags that make up the semantic fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConceptFlags {
    /// 0 when no action verb matched.
    pub verb_class: u8,
    pub has_ipv4: bool,
    pub has_host_noun: bool,
    pub has_phase_noun: bool,
}

impl ConceptFlags {
    pub fn of(message: &str) -> Self {
        let verb_class = VERB_CLASSES
            .iter()
            .position(|re| re.is_match(message))
            .map_or(0, |idx| idx as u8 + 1);
        Self {
            verb_class,
            has_ipv4: IPV4_PRESENT.is_match(message),
            has_host_noun: HOST_NOUN.is_match(message),
            has_phase_noun: PHASE_NOUN.is_match(message),
        }
    }
}

/// Exact and semantic fingerprints of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    pub exact: [u8; 32],
    pub semantic: [u8; 32],
}

impl DedupKey {
    pub fn derive(source: &str, message: &str) -> Self {
        let mut exact = blake3::Hasher::new();
        exact.update(source.as_bytes());
        exact.update(&[0]);
        exact.update(message.as_bytes());

        let flags = ConceptFlags::of(message);
        let mut semantic = blake3::Hasher::new();
        semantic.update(source.as_bytes());
        semantic.update(&[
            0,
            flags.verb_class,
            flags.has_ipv4 as u8,
            flags.has_host_noun as u8,
            flags.has_phase_noun as u8,
        ]);

        Self {
            exact: *exact.finalize().as_bytes(),
            semantic: *semantic.finalize().as_bytes(),
        }
    }
}

/// Why an event was suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    Fresh,
    ExactDuplicate,
    SemanticDuplicate,
}

impl DedupVerdict {
    pub fn is_fresh(self) -> bool {
        self == Self::Fresh
    }
}

/// Last-seen tables for both fingerprints.
///
/// Owned by the dispatch loop; entries past their TTL never block and are
/// purged opportunistically.
#[derive(Debug)]
pub struct DedupTable {
    exact_ttl: Duration,
    semantic_ttl: Duration,
    exact: HashMap<[u8; 32], Instant>,
    semantic: HashMap<[u8; 32], Instant>,
}

impl DedupTable {
    pub fn new(exact_ttl: Duration, semantic_ttl: Duration) -> Self {
        Self {
            exact_ttl,
            semantic_ttl,
            exact: HashMap::new(),
            semantic: HashMap::new(),
        }
    }

    /// Check both fingerprints and, when the event is fresh, record them.
    ///
    /// A suppressed event does not refresh either timestamp.
    pub fn check_and_record(&mut self, key: &DedupKey, now: Instant) -> DedupVerdict {
        self.purge(now);

        if seen_within(&self.exact, &key.exact, now, self.exact_ttl) {
            debug!("Exact duplicate suppressed");
            return DedupVerdict::ExactDuplicate;
        }
        if seen_within(&self.semantic, &key.semantic, now, self.semantic_ttl) {
            debug!("Semantic duplicate suppressed");
            return DedupVerdict::SemanticDuplicate;
        }

        self.exact.insert(key.exact, now);
        self.semantic.insert(key.semantic, now);
        DedupVerdict::Fresh
    }

    /// Drop expired entries
    pub fn purge(&mut self, now: Instant) {
        let (exact_ttl, semantic_ttl) = (self.exact_ttl, self.semantic_ttl);
        self.exact.retain(|_, seen| now.duration_since(*seen) < exact_ttl);
        self.semantic.retain(|_, seen| now.duration_since(*seen) < semantic_ttl);
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

impl Default for DedupTable {
    fn default() -> Self {
        Self::new(DEFAULT_EXACT_TTL, DEFAULT_SEMANTIC_TTL)
    }
}

fn seen_within(
    table: &HashMap<[u8; 32], Instant>,
    key: &[u8; 32],
    now: Instant,
    ttl: Duration,
) -> bool {
    table
        .get(key)
        .is_some_and(|seen| now.duration_since(*seen) < ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "Attack Agent";

    #[test]
    fn test_concept_flags() {
        let flags = ConceptFlags::of("scan detected on firewall, malicious IP 192.168.100.11 found");
        assert_eq!(flags.verb_class, 1);
        assert!(flags.has_ipv4);
        assert!(flags.has_host_noun);
        assert!(!flags.has_phase_noun);

        let flags = ConceptFlags::of("reconnaissance phase finished");
        assert_eq!(flags.verb_class, 0);
        assert!(flags.has_phase_noun);
    }

    #[test]
    fn test_reworded_message_shares_semantic_key() {
        let a = DedupKey::derive(SOURCE, "attacker scans firewall at 10.0.0.1");
        let b = DedupKey::derive(SOURCE, "attacker probing firewall at 10.0.0.2");
        assert_ne!(a.exact, b.exact);
        assert_eq!(a.semantic, b.semantic);

        // Different sources never collide.
        let c = DedupKey::derive("Other Agent", "attacker scans firewall at 10.0.0.1");
        assert_ne!(a.semantic, c.semantic);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_duplicate_within_ttl() {
        let mut table = DedupTable::default();
        let key = DedupKey::derive(SOURCE, "attacker scans firewall");

        let t0 = Instant::now();
        assert!(table.check_and_record(&key, t0).is_fresh());
        assert_eq!(
            table.check_and_record(&key, t0 + Duration::from_secs(3)),
            DedupVerdict::ExactDuplicate
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_semantic_duplicate_outlives_exact_ttl() {
        let mut table = DedupTable::default();
        let key = DedupKey::derive(SOURCE, "attacker scans firewall");

        let t0 = Instant::now();
        assert!(table.check_and_record(&key, t0).is_fresh());
        // Exact entry expired, semantic still live.
        assert_eq!(
            table.check_and_record(&key, t0 + Duration::from_secs(6)),
            DedupVerdict::SemanticDuplicate
        );
        assert!(table
            .check_and_record(&key, t0 + Duration::from_secs(10))
            .is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_event_does_not_refresh() {
        let mut table = DedupTable::default();
        let key = DedupKey::derive(SOURCE, "attacker scans firewall");

        let t0 = Instant::now();
        table.check_and_record(&key, t0);
        table.check_and_record(&key, t0 + Duration::from_secs(9));
        assert!(table
            .check_and_record(&key, t0 + Duration::from_secs(10))
            .is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_purged() {
        let mut table = DedupTable::default();
        let t0 = Instant::now();
        table.check_and_record(&DedupKey::derive(SOURCE, "a"), t0);
        table.check_and_record(&DedupKey::derive("B", "b"), t0);
        assert_eq!(table.len(), 2);

        table.purge(t0 + Duration::from_secs(11));
        assert!(table.is_empty());
    }
}
