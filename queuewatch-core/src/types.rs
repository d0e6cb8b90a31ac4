//! Domain types for the queuewatch registry.
//!
//! All types are serializable via serde + serde_json; the registry file is a
//! plain JSON array of [`MonitorConfig`] entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a monitor. Opaque, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorId(pub String);

impl MonitorId {
    /// Generate a fresh, unique id (UUIDv4 string).
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MonitorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MonitorId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Default poll period: 30 seconds.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

/// The identifying-field transition detected between two consecutive polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugChange {
    pub previous: Option<String>,
    pub current: Option<String>,
}

/// Structured output describing a detected slug change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceRecord {
    /// Display name of the record at detection time, if it carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `endpoint_url` joined with the new slug.
    pub url: String,
    pub slug_change: SlugChange,
    pub detected_at: DateTime<Utc>,
}

/// One user-defined watch: endpoint, filter, interval, run state, last-seen data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub id: MonitorId,
    pub name: String,
    /// May be empty: polling refuses to run a cycle until a URL is set.
    pub endpoint_url: String,
    /// Selects one record out of a multi-record response by `name`/`id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_key: Option<String>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// True iff an active recurring timer exists for this id.
    #[serde(default)]
    pub is_running: bool,
    /// Last successfully extracted record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<Value>,
    /// Most recent detected change; untouched by cycles that see no change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_difference: Option<DifferenceRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitorConfig {
    /// Build a new monitor with a fresh id and defaults (stopped, no data).
    pub fn new(
        name: impl Into<String>,
        endpoint_url: impl Into<String>,
        filter_key: Option<String>,
        interval_seconds: Option<u64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MonitorId::fresh(),
            name: name.into(),
            endpoint_url: endpoint_url.into(),
            filter_key,
            interval_seconds: interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS),
            is_running: false,
            last_snapshot: None,
            last_difference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newtype_display() {
        assert_eq!(MonitorId::from("m-01").to_string(), "m-01");
    }

    #[test]
    fn fresh_ids_are_unique() {
        assert_ne!(MonitorId::fresh(), MonitorId::fresh());
    }

    #[test]
    fn new_monitor_defaults() {
        let m = MonitorConfig::new("queues", "https://api.example.com/queues", None, None);
        assert_eq!(m.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert!(!m.is_running);
        assert!(m.last_snapshot.is_none());
        assert!(m.last_difference.is_none());
    }

    #[test]
    fn config_serde_roundtrip() {
        let mut m = MonitorConfig::new("q", "https://example.com", Some("main".into()), Some(5));
        m.last_snapshot = Some(json!({"name": "main", "slug": "v1"}));
        let encoded = serde_json::to_string(&m).expect("serialize");
        let decoded: MonitorConfig = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(m, decoded);
    }

    #[test]
    fn missing_interval_defaults_to_thirty() {
        let raw = json!({
            "id": "abc",
            "name": "q",
            "endpoint_url": "https://example.com",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        });
        let m: MonitorConfig = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(m.interval_seconds, 30);
        assert!(!m.is_running);
    }
}
