//! Raw event types handed over by source connectors.
//!
//! These are the untyped records as the connectors read them. Nothing here is
//! validated yet - the core turns them into [`EventRecord`]s and skips the
//! ones it cannot resolve.
//!
//! [`EventRecord`]: crate::core::EventRecord

use serde::{Deserialize, Serialize};

/// Timestamp as it appears in the source data.
///
/// Commit logs carry unix seconds (possibly fractional), GH Archive carries
/// RFC3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Unix(f64),
    Text(String),
}

impl From<f64> for RawTimestamp {
    fn from(secs: f64) -> Self {
        RawTimestamp::Unix(secs)
    }
}

impl From<i64> for RawTimestamp {
    fn from(secs: i64) -> Self {
        RawTimestamp::Unix(secs as f64)
    }
}

impl From<&str> for RawTimestamp {
    fn from(text: &str) -> Self {
        RawTimestamp::Text(text.to_string())
    }
}

impl From<String> for RawTimestamp {
    fn from(text: String) -> Self {
        RawTimestamp::Text(text)
    }
}

/// One activity event as delivered by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Actor identity string (login, `name-email`, ...)
    pub actor: Option<String>,
    /// Source-side actor id the connector could not map to an identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_actor_id: Option<usize>,
    /// Subject identity strings, in source order
    #[serde(default)]
    pub subjects: Vec<String>,
    /// When the event happened
    pub timestamp: RawTimestamp,
    /// Event kind string (`commit`, `PushEvent`, ...)
    pub kind: String,
    /// Source-specific payload, passed through untouched
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn new(
        actor: impl Into<String>,
        subjects: Vec<String>,
        timestamp: impl Into<RawTimestamp>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            actor: Some(actor.into()),
            unknown_actor_id: None,
            subjects,
            timestamp: timestamp.into(),
            kind: kind.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
