//! Event types carried by the engagement bus
//!
//! Every message on the bus is a flat JSON object with three required
//! fields (`level`, `source`, `message`), an optional `timestamp`, and any
//! number of extra keys that travel along as the structured extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Unix timestamps below this value are treated as monotonic clock readings
/// rather than wall-clock time and get replaced on ingest.
const MIN_WALL_CLOCK_SECS: f64 = 1_000_000_000.0;

/// Severity attached to every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
    Success,
    Critical,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Success => write!(f, "success"),
            Self::Critical => write!(f, "critical"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Level {
    type Err = MalformedEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "success" => Ok(Self::Success),
            "critical" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            other => Err(MalformedEvent::UnknownLevel(other.to_string())),
        }
    }
}

/// Reasons an inbound message is rejected by the bus
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing or empty required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown level `{0}`")]
    UnknownLevel(String),
}

/// An unvalidated message as it arrives on the wire.
///
/// Every field is optional here; [`Event::validate`] decides whether the
/// message is fit for broadcast.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extension: Map<String, Value>,
}

impl RawEvent {
    /// Parse a wire message
    pub fn from_json(text: &str) -> Result<Self, MalformedEvent> {
        serde_json::from_str(text).map_err(|e| MalformedEvent::InvalidJson(e.to_string()))
    }
}

/// A validated, immutable bus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub source: String,
    pub message: String,
    /// Extra top-level keys, consumed opportunistically downstream.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extension: Map<String, Value>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(level: Level, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            source: source.into(),
            message: message.into(),
            extension: Map::new(),
        }
    }

    pub fn info(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Info, source, message)
    }

    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Warning, source, message)
    }

    pub fn success(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Success, source, message)
    }

    pub fn critical(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Critical, source, message)
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Error, source, message)
    }

    /// Attach a structured extension field
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extension.insert(key.into(), value);
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Look up a structured extension field
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extension.get(key)
    }

    /// Validate a raw wire message, assigning `now` when no usable
    /// timestamp was supplied.
    pub fn validate(raw: RawEvent, now: DateTime<Utc>) -> Result<Self, MalformedEvent> {
        let level = required(raw.level, "level")?.parse::<Level>()?;
        let source = required(raw.source, "source")?;
        let message = required(raw.message, "message")?;
        let timestamp = raw.timestamp.as_ref().and_then(parse_timestamp).unwrap_or(now);

        Ok(Self {
            timestamp,
            level,
            source,
            message,
            extension: raw.extension,
        })
    }

    /// Parse and validate a wire message in one step
    pub fn from_json(text: &str, now: DateTime<Utc>) -> Result<Self, MalformedEvent> {
        Self::validate(RawEvent::from_json(text)?, now)
    }

    /// Check the required fields of an already-built event
    pub fn ensure_valid(&self) -> Result<(), MalformedEvent> {
        if self.source.trim().is_empty() {
            return Err(MalformedEvent::MissingField("source"));
        }
        if self.message.trim().is_empty() {
            return Err(MalformedEvent::MissingField("message"));
        }
        Ok(())
    }

    /// Serialize to the wire format
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Short message preview for logs
    pub fn preview(&self) -> String {
        self.message.chars().take(60).collect()
    }
}

fn required(field: Option<String>, name: &'static str) -> Result<String, MalformedEvent> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MalformedEvent::MissingField(name)),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if secs < MIN_WALL_CLOCK_SECS {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            DateTime::from_timestamp(whole, nanos)
        }
        _ => None,
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
    fn test_valid_event_gets_timestamp_assigned() {
        let event = Event::from_json(
            r#"{"level":"info","source":"Attack Agent","message":"attacker scans firewall"}"#,
            now(),
        )
        .unwrap();
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.timestamp, now());
        assert!(event.extension.is_empty());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = Event::from_json(r#"{"level":"info","source":"x"}"#, now()).unwrap_err();
        assert_eq!(err, MalformedEvent::MissingField("message"));

        let err = Event::from_json(r#"{"level":"info","source":"  ","message":"m"}"#, now())
            .unwrap_err();
        assert_eq!(err, MalformedEvent::MissingField("source"));

        let err = Event::from_json(r#"{"source":"x","message":"m"}"#, now()).unwrap_err();
        assert_eq!(err, MalformedEvent::MissingField("level"));
    }

    #[test]
    fn test_unknown_level_rejected() {
        let err = Event::from_json(r#"{"level":"loud","source":"x","message":"m"}"#, now())
            .unwrap_err();
        assert!(matches!(err, MalformedEvent::UnknownLevel(_)));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = Event::from_json("not json", now()).unwrap_err();
        assert!(matches!(err, MalformedEvent::InvalidJson(_)));
    }

    #[test]
    fn test_extension_fields_preserved() {
        let event = Event::from_json(
            r#"{"level":"warning","source":"Battle Judge","message":"m","battle_state":{"status":"ongoing"}}"#,
            now(),
        )
        .unwrap();
        assert_eq!(
            event.extension("battle_state").unwrap()["status"],
            Value::String("ongoing".into())
        );

        let wire: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(wire["battle_state"]["status"], "ongoing");
        assert_eq!(wire["level"], "warning");
    }

    #[test]
    fn test_timestamp_formats() {
        let rfc = Event::from_json(
            r#"{"level":"info","source":"s","message":"m","timestamp":"2025-01-02T03:04:05Z"}"#,
            now(),
        )
        .unwrap();
        assert_eq!(rfc.timestamp, Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());

        let unix = Event::from_json(
            r#"{"level":"info","source":"s","message":"m","timestamp":1735787045}"#,
            now(),
        )
        .unwrap();
        assert_eq!(unix.timestamp, Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());

        // Event-loop clock readings are not wall-clock time.
        let monotonic = Event::from_json(
            r#"{"level":"info","source":"s","message":"m","timestamp":8123.5}"#,
            now(),
        )
        .unwrap();
        assert_eq!(monotonic.timestamp, now());
    }

    #[test]
    fn test_level_parsing_is_case_insensitive() {
        assert_eq!("CRITICAL".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!(Level::Success.to_string(), "success");
    }
}
