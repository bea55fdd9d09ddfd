use std::path::Path;
use std::time::Duration;

use engagement::config::BusConfig;
use engagement::{AgentIdentities, ConfigOverrides, ConfigResult, EngagementConfig};

/// Addresses the defense endpoints bind by default, matching the hub's
/// default dispatch URLs.
pub const DEFAULT_DEFENDER_LISTEN: [&str; 3] = ["127.0.0.1:8011", "127.0.0.1:8012", "127.0.0.1:8013"];

/// Top-level range agent configuration.
///
/// The hub endpoint, reconnect delay and identities come from the same
/// layered [`EngagementConfig`] the hub reads; the paces from `RANGE_*`
/// variables.
#[derive(Debug, Clone)]
pub struct RangeConfig {
    /// Hub WebSocket endpoint and reconnect delay.
    pub bus: BusConfig,
    /// Delay between attacker script steps.
    pub attack_pace: Duration,
    /// Base delay between defense cascade steps.
    pub defense_pace: Duration,
    pub identities: AgentIdentities,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self::from_engagement(EngagementConfig::default())
    }
}

impl RangeConfig {
    /// Keep the bus and identity sections of a resolved hub config
    pub fn from_engagement(config: EngagementConfig) -> Self {
        Self {
            bus: config.bus,
            attack_pace: Duration::from_millis(env_millis("RANGE_ATTACK_PACE_MS").unwrap_or(2_000)),
            defense_pace: Duration::from_millis(env_millis("RANGE_DEFENSE_PACE_MS").unwrap_or(1_000)),
            identities: config.identities,
        }
    }

    /// Defaults, then `path`, then `ENGAGEMENT_*` variables, then `bus_url`
    pub fn resolve(path: Option<&Path>, bus_url: Option<String>) -> ConfigResult<Self> {
        let overrides = ConfigOverrides {
            bus_url,
            ..Default::default()
        };
        Ok(Self::from_engagement(EngagementConfig::resolve(path, &overrides)?))
    }

    /// Source name the scripted attacker publishes under
    pub fn attacker_identity(&self) -> &str {
        self.identities
            .attackers
            .first()
            .map(String::as_str)
            .unwrap_or("Attack Agent")
    }
}

fn env_millis(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}
