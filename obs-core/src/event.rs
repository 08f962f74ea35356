//! Event model and wire format
//!
//! An [`Event`] is one reported occurrence. It serializes to the JSON object
//! the collector expects on `POST /api/events`:
//!
//! ```text
//! event_id, level, message, stacktrace[], platform, timestamp,
//! server_name, environment, extra{}
//! ```
//!
//! `stacktrace`, `server_name`, `environment` and `extra` are omitted when
//! empty.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform tag stamped on every event from this SDK
pub const PLATFORM: &str = "rust";

/// Wire format of [`Event::timestamp`] (UTC, second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Info,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warning" | "warn" => Ok(Level::Warning),
            "info" => Ok(Level::Info),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// A single frame in a stacktrace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub filename: String,
    pub function: String,
    pub lineno: u32,
}

/// Identifier handed back to capture callers
///
/// Empty means the event was not sent (no agent installed, or nothing to
/// report). A non-empty id means "accepted for reporting", not "delivered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventId(String);

impl EventId {
    /// The "nothing happened" id.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> String {
        id.0
    }
}

impl PartialEq<str> for EventId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EventId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Generate a fresh event identifier.
///
/// 36 characters, hyphenated 8-4-4-4-12 lowercase hex, with the version 4 and
/// RFC 4122 variant bits set.
pub fn generate_event_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// One reported occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub level: Level,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacktrace: Vec<StackFrame>,
    pub platform: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Event {
    /// Create an event stamped with a fresh id and the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self::at(level, message, Utc::now())
    }

    /// Create an event with an explicit timestamp.
    pub fn at(level: Level, message: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            event_id: generate_event_id(),
            level,
            message: message.into(),
            stacktrace: Vec::new(),
            platform: PLATFORM.to_string(),
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            server_name: String::new(),
            environment: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_stacktrace(mut self, stacktrace: Vec<StackFrame>) -> Self {
        self.stacktrace = stacktrace;
        self
    }

    pub fn with_tags(mut self, server_name: &str, environment: &str) -> Self {
        self.server_name = server_name.to_string();
        self.environment = environment.to_string();
        self
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, serde_json::Value>) -> Self {
        self.extra.extend(extra);
        self
    }

    /// The id callers get back for this event.
    pub fn id(&self) -> EventId {
        EventId(self.event_id.clone())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_event_id_shape() {
        let id = generate_event_id();
        assert_eq!(id.len(), 36);
        for (i, c) in id.chars().enumerate() {
            if [8, 13, 18, 23].contains(&i) {
                assert_eq!(c, '-', "expected hyphen at {} in {}", i, id);
            } else {
                assert!(c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
            }
        }
        assert_eq!(&id[14..15], "4");
        assert!(matches!(&id[19..20], "8" | "9" | "a" | "b"));
    }

    #[test]
    fn test_event_ids_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(generate_event_id()));
            std::thread::sleep(std::time::Duration::from_micros(1));
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_timestamp_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let event = Event::at(Level::Info, "hello", time);
        assert_eq!(event.timestamp, "2024-03-09 07:05:01");
        assert_eq!(event.platform, "rust");
    }

    #[test]
    fn test_json_omits_empty_optional_fields() {
        let event = Event::new(Level::Info, "deployment started");
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["level"], "info");
        assert_eq!(obj["message"], "deployment started");
        assert_eq!(obj["event_id"], event.event_id.as_str());
        assert!(!obj.contains_key("stacktrace"));
        assert!(!obj.contains_key("server_name"));
        assert!(!obj.contains_key("environment"));
        assert!(!obj.contains_key("extra"));
    }

    #[test]
    fn test_json_full_event() {
        let mut extra = BTreeMap::new();
        extra.insert("user".to_string(), serde_json::json!("42"));

        let event = Event::new(Level::Error, "boom")
            .with_stacktrace(vec![StackFrame {
                filename: "src/main.rs".into(),
                function: "app::main".into(),
                lineno: 12,
            }])
            .with_tags("web-1", "production")
            .with_extra(extra);

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["level"], "error");
        assert_eq!(value["server_name"], "web-1");
        assert_eq!(value["environment"], "production");
        assert_eq!(value["extra"]["user"], "42");
        assert_eq!(
            value["stacktrace"][0],
            serde_json::json!({"filename": "src/main.rs", "function": "app::main", "lineno": 12})
        );
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("error".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert!("fatal".parse::<Level>().is_err());
    }

    #[test]
    fn test_event_id_none() {
        let id = EventId::none();
        assert!(id.is_empty());
        assert_eq!(id, "");
    }
}
