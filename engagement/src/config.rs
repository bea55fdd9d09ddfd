//! Engagement configuration
//!
//! Resolution order, later layers winning:
//!
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. `ENGAGEMENT_*` environment variables
//! 4. Command-line overrides ([`ConfigOverrides`])
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `ENGAGEMENT_LISTEN` | `bus.listen` |
//! | `ENGAGEMENT_BUS_URL` | `bus.url` |
//! | `ENGAGEMENT_RECONNECT_SECS` | `bus.reconnect_secs` |
//! | `ENGAGEMENT_THREAT_BLOCKING_URL` | `dispatch.threat_blocking_url` |
//! | `ENGAGEMENT_VULNERABILITY_REMEDIATION_URL` | `dispatch.vulnerability_remediation_url` |
//! | `ENGAGEMENT_ATTACK_ATTRIBUTION_URL` | `dispatch.attack_attribution_url` |
//! | `ENGAGEMENT_EXACT_TTL_SECS` | `dispatch.exact_ttl_secs` |
//! | `ENGAGEMENT_SEMANTIC_TTL_SECS` | `dispatch.semantic_ttl_secs` |
//! | `ENGAGEMENT_THREAT_BLOCKING_INTERVAL_SECS` | `dispatch.threat_blocking_interval_secs` |
//! | `ENGAGEMENT_VULNERABILITY_REMEDIATION_INTERVAL_SECS` | `dispatch.vulnerability_remediation_interval_secs` |
//! | `ENGAGEMENT_ATTACK_ATTRIBUTION_INTERVAL_SECS` | `dispatch.attack_attribution_interval_secs` |
//! | `ENGAGEMENT_DISPATCH_TIMEOUT_SECS` | `dispatch.timeout_secs` |
//! | `ENGAGEMENT_PAUSE_MS` | `dispatch.pause_ms` |
//! | `ENGAGEMENT_CAMPAIGN_TIMEOUT_SECS` | `arbiter.campaign_timeout_secs` |
//! | `ENGAGEMENT_STRICT_DEFENSE` | `arbiter.require_all_defense_actions` |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arbiter::ArbiterSettings;
use crate::client::BusClient;
use crate::dispatch::{DispatchSettings, ResponseClass};
use crate::identity::AgentIdentities;
use crate::resilience::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub bus: BusConfig,
    pub dispatch: DispatchConfig,
    pub arbiter: ArbiterConfig,
    pub identities: AgentIdentities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Address the hub listens on.
    pub listen: String,
    /// Where remote clients connect.
    pub url: String,
    pub channel_capacity: usize,
    pub history_limit: usize,
    pub reconnect_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            url: "ws://127.0.0.1:8080/ws/logs".to_string(),
            channel_capacity: crate::events::CHANNEL_CAPACITY,
            history_limit: crate::events::DEFAULT_HISTORY_LIMIT,
            reconnect_secs: 5,
        }
    }
}

impl BusConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }

    /// Remote client for `identity`, reconnecting forever at
    /// [`Self::reconnect_delay`]
    pub fn client(&self, identity: impl Into<String>) -> BusClient {
        BusClient::new(self.url.clone(), identity)
            .with_retry(RetryPolicy::unbounded(self.reconnect_delay()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub threat_blocking_url: String,
    pub vulnerability_remediation_url: String,
    pub attack_attribution_url: String,
    pub exact_ttl_secs: u64,
    pub semantic_ttl_secs: u64,
    pub threat_blocking_interval_secs: u64,
    pub vulnerability_remediation_interval_secs: u64,
    pub attack_attribution_interval_secs: u64,
    /// Pause between two class calls for the same event.
    pub pause_ms: u64,
    /// Per-request timeout for defense calls.
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            threat_blocking_url: "http://127.0.0.1:8011/execute_threat_blocking".to_string(),
            vulnerability_remediation_url: "http://127.0.0.1:8012/execute_vulnerability_remediation"
                .to_string(),
            attack_attribution_url: "http://127.0.0.1:8013/execute_attack_attribution".to_string(),
            exact_ttl_secs: 5,
            semantic_ttl_secs: 10,
            threat_blocking_interval_secs: 5,
            vulnerability_remediation_interval_secs: 15,
            attack_attribution_interval_secs: 30,
            pause_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl DispatchConfig {
    /// Endpoint URL per response class
    pub fn endpoints(&self) -> HashMap<ResponseClass, String> {
        HashMap::from([
            (ResponseClass::ThreatBlocking, self.threat_blocking_url.clone()),
            (
                ResponseClass::VulnerabilityRemediation,
                self.vulnerability_remediation_url.clone(),
            ),
            (ResponseClass::AttackAttribution, self.attack_attribution_url.clone()),
        ])
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings {
            exact_ttl: Duration::from_secs(self.exact_ttl_secs),
            semantic_ttl: Duration::from_secs(self.semantic_ttl_secs),
            intervals: HashMap::from([
                (
                    ResponseClass::ThreatBlocking,
                    Duration::from_secs(self.threat_blocking_interval_secs),
                ),
                (
                    ResponseClass::VulnerabilityRemediation,
                    Duration::from_secs(self.vulnerability_remediation_interval_secs),
                ),
                (
                    ResponseClass::AttackAttribution,
                    Duration::from_secs(self.attack_attribution_interval_secs),
                ),
            ]),
            pause: Duration::from_millis(self.pause_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub campaign_timeout_secs: u64,
    pub tick_secs: u64,
    /// Require all six defense flags instead of the core four.
    pub require_all_defense_actions: bool,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            campaign_timeout_secs: 15 * 60,
            tick_secs: 5,
            require_all_defense_actions: false,
        }
    }
}

impl ArbiterConfig {
    pub fn settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            campaign_timeout: Duration::from_secs(self.campaign_timeout_secs),
            tick: Duration::from_secs(self.tick_secs.max(1)),
            require_all_defense_actions: self.require_all_defense_actions,
        }
    }
}

/// Command-line overrides. `None` leaves the resolved value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub bus_url: Option<String>,
    pub campaign_timeout_secs: Option<u64>,
    pub require_all_defense_actions: Option<bool>,
}

impl EngagementConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `ENGAGEMENT_*` variables from `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ENGAGEMENT_LISTEN") {
            self.bus.listen = v;
        }
        if let Some(v) = lookup("ENGAGEMENT_BUS_URL") {
            self.bus.url = v;
        }
        if let Some(v) = lookup("ENGAGEMENT_RECONNECT_SECS") {
            self.bus.reconnect_secs = parse_value("ENGAGEMENT_RECONNECT_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_THREAT_BLOCKING_URL") {
            self.dispatch.threat_blocking_url = v;
        }
        if let Some(v) = lookup("ENGAGEMENT_VULNERABILITY_REMEDIATION_URL") {
            self.dispatch.vulnerability_remediation_url = v;
        }
        if let Some(v) = lookup("ENGAGEMENT_ATTACK_ATTRIBUTION_URL") {
            self.dispatch.attack_attribution_url = v;
        }
        if let Some(v) = lookup("ENGAGEMENT_EXACT_TTL_SECS") {
            self.dispatch.exact_ttl_secs = parse_value("ENGAGEMENT_EXACT_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_SEMANTIC_TTL_SECS") {
            self.dispatch.semantic_ttl_secs = parse_value("ENGAGEMENT_SEMANTIC_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_THREAT_BLOCKING_INTERVAL_SECS") {
            self.dispatch.threat_blocking_interval_secs =
                parse_value("ENGAGEMENT_THREAT_BLOCKING_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_VULNERABILITY_REMEDIATION_INTERVAL_SECS") {
            self.dispatch.vulnerability_remediation_interval_secs =
                parse_value("ENGAGEMENT_VULNERABILITY_REMEDIATION_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_ATTACK_ATTRIBUTION_INTERVAL_SECS") {
            self.dispatch.attack_attribution_interval_secs =
                parse_value("ENGAGEMENT_ATTACK_ATTRIBUTION_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_DISPATCH_TIMEOUT_SECS") {
            self.dispatch.timeout_secs = parse_value("ENGAGEMENT_DISPATCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_PAUSE_MS") {
            self.dispatch.pause_ms = parse_value("ENGAGEMENT_PAUSE_MS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_CAMPAIGN_TIMEOUT_SECS") {
            self.arbiter.campaign_timeout_secs = parse_value("ENGAGEMENT_CAMPAIGN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ENGAGEMENT_STRICT_DEFENSE") {
            self.arbiter.require_all_defense_actions = parse_bool(&v);
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = &overrides.listen {
            self.bus.listen = v.clone();
        }
        if let Some(v) = &overrides.bus_url {
            self.bus.url = v.clone();
        }
        if let Some(v) = overrides.campaign_timeout_secs {
            self.arbiter.campaign_timeout_secs = v;
        }
        if let Some(v) = overrides.require_all_defense_actions {
            self.arbiter.require_all_defense_actions = v;
        }
    }

    /// Defaults, then `path`, then the process environment, then `overrides`
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        Ok(config)
    }
}

/// "1", "true" or "yes" (case-insensitive) are true; anything else is false
fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
