//! Canonical event model.
//!
//! Raw records become [`EventRecord`]s here. Actor and subject identity
//! strings are interned into dense integer ids; the actor index assigned
//! during a run is the row/column index of every interaction graph the run
//! produces.

use crate::source::types::{RawEvent, RawTimestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Dense id of a registered actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub usize);

/// Dense id of a registered subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub usize);

impl ActorId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl SubjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Interns identity strings into dense ids, in first-seen order.
///
/// Ids are never reassigned or removed.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    ids: HashMap<String, usize>,
    names: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `identity`, registering it if unseen.
    pub fn intern(&mut self, identity: &str) -> usize {
        if let Some(&id) = self.ids.get(identity) {
            return id;
        }
        let id = self.names.len();
        self.ids.insert(identity.to_string(), id);
        self.names.push(identity.to_string());
        id
    }

    pub fn get(&self, identity: &str) -> Option<usize> {
        self.ids.get(identity).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Identities in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Kind of activity an event records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Commit,
    Push,
    PullRequest,
    Issues,
    IssueComment,
    Fork,
    Watch,
    Other(String),
}

impl EventKind {
    /// Map a raw kind string onto a kind. Unrecognised strings are kept.
    pub fn parse(kind: &str) -> Self {
        match kind {
            "commit" => EventKind::Commit,
            "PushEvent" => EventKind::Push,
            "PullRequestEvent" => EventKind::PullRequest,
            "IssuesEvent" => EventKind::Issues,
            "IssueCommentEvent" => EventKind::IssueComment,
            "ForkEvent" => EventKind::Fork,
            "WatchEvent" => EventKind::Watch,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Commit => "commit",
            EventKind::Push => "PushEvent",
            EventKind::PullRequest => "PullRequestEvent",
            EventKind::Issues => "IssuesEvent",
            EventKind::IssueComment => "IssueCommentEvent",
            EventKind::Fork => "ForkEvent",
            EventKind::Watch => "WatchEvent",
            EventKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped activity event. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    actor: ActorId,
    subjects: Vec<SubjectId>,
    timestamp: DateTime<Utc>,
    kind: EventKind,
    payload: serde_json::Value,
}

impl EventRecord {
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn subjects(&self) -> &[SubjectId] {
        &self.subjects
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// Reasons a raw record is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("record has no actor")]
    MissingActor,

    #[error("actor id {0} is not registered")]
    UnknownActor(usize),
}

/// Resolve a raw timestamp into an instant.
pub fn parse_timestamp(raw: &RawTimestamp) -> Result<DateTime<Utc>, RecordError> {
    match raw {
        RawTimestamp::Unix(secs) => from_unix(*secs),
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(parsed.with_timezone(&Utc));
            }
            match text.parse::<f64>() {
                Ok(secs) => from_unix(secs),
                Err(_) => Err(RecordError::InvalidTimestamp(text.to_string())),
            }
        }
    }
}

fn from_unix(secs: f64) -> Result<DateTime<Utc>, RecordError> {
    if !secs.is_finite() {
        return Err(RecordError::InvalidTimestamp(secs.to_string()));
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| RecordError::InvalidTimestamp(secs.to_string()))
}

/// Tally of an ingest pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: u64,
    pub invalid_timestamp: u64,
    pub missing_actor: u64,
    pub unknown_actor: u64,
}

impl IngestReport {
    /// Number of records skipped for any reason.
    pub fn skipped(&self) -> u64 {
        self.invalid_timestamp + self.missing_actor + self.unknown_actor
    }

    fn note(&mut self, error: &RecordError) {
        match error {
            RecordError::InvalidTimestamp(_) => self.invalid_timestamp += 1,
            RecordError::MissingActor => self.missing_actor += 1,
            RecordError::UnknownActor(_) => self.unknown_actor += 1,
        }
    }
}

/// Actor and subject registries for one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    actors: Registry,
    subjects: Registry,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register actors so their ids follow the given order.
    pub fn with_actors<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self::new();
        for identity in identities {
            catalog.actors.intern(identity.as_ref());
        }
        catalog
    }

    pub fn register_actor(&mut self, identity: &str) -> ActorId {
        ActorId(self.actors.intern(identity))
    }

    pub fn register_subject(&mut self, identity: &str) -> SubjectId {
        SubjectId(self.subjects.intern(identity))
    }

    pub fn actors(&self) -> &Registry {
        &self.actors
    }

    pub fn subjects(&self) -> &Registry {
        &self.subjects
    }

    /// Size of the actor population.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn subject_name(&self, id: SubjectId) -> Option<&str> {
        self.subjects.name(id.index())
    }

    /// Build a record for an already-registered actor.
    pub fn record(
        &mut self,
        actor: ActorId,
        subjects: &[&str],
        timestamp: DateTime<Utc>,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Result<EventRecord, RecordError> {
        if actor.index() >= self.actors.len() {
            return Err(RecordError::UnknownActor(actor.index()));
        }
        let subjects = subjects.iter().map(|s| self.register_subject(s)).collect();
        Ok(EventRecord {
            actor,
            subjects,
            timestamp,
            kind,
            payload,
        })
    }

    /// Resolve a raw record, registering its actor and subjects.
    ///
    /// The timestamp is checked before anything is registered, so a rejected
    /// record leaves the registries untouched.
    pub fn resolve(&mut self, raw: RawEvent) -> Result<EventRecord, RecordError> {
        let timestamp = parse_timestamp(&raw.timestamp)?;
        let actor = match raw.actor.as_deref().map(str::trim) {
            Some(identity) if !identity.is_empty() => self.register_actor(identity),
            _ => {
                return Err(match raw.unknown_actor_id {
                    Some(id) => RecordError::UnknownActor(id),
                    None => RecordError::MissingActor,
                })
            }
        };
        let subjects = raw
            .subjects
            .iter()
            .map(|s| self.register_subject(s))
            .collect();

        Ok(EventRecord {
            actor,
            subjects,
            timestamp,
            kind: EventKind::parse(&raw.kind),
            payload: raw.payload,
        })
    }

    /// Resolve a batch, skipping malformed records and counting them.
    pub fn ingest<I>(&mut self, raw: I) -> (Vec<EventRecord>, IngestReport)
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut report = IngestReport::default();
        let mut events = Vec::new();

        for record in raw {
            match self.resolve(record) {
                Ok(event) => {
                    report.accepted += 1;
                    events.push(event);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed record");
                    report.note(&e);
                }
            }
        }

        if report.skipped() > 0 {
            tracing::warn!(
                skipped = report.skipped(),
                accepted = report.accepted,
                "skipped malformed records"
            );
        }

        (events, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_first_seen_order() {
        let mut registry = Registry::new();
        assert_eq!(registry.intern("alice"), 0);
        assert_eq!(registry.intern("bob"), 1);
        assert_eq!(registry.intern("alice"), 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name(1), Some("bob"));
        assert_eq!(registry.get("carol"), None);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let rfc = parse_timestamp(&RawTimestamp::from("2020-03-12T16:04:05Z")).unwrap();
        assert_eq!(rfc.timestamp(), 1_584_029_045);

        let unix = parse_timestamp(&RawTimestamp::Unix(1_584_029_045.25)).unwrap();
        assert_eq!(unix.timestamp(), 1_584_029_045);
        assert_eq!(unix.timestamp_subsec_millis(), 250);

        let numeric_text = parse_timestamp(&RawTimestamp::from("1584029045")).unwrap();
        assert_eq!(numeric_text, rfc);

        assert!(matches!(
            parse_timestamp(&RawTimestamp::from("yesterday")),
            Err(RecordError::InvalidTimestamp(_))
        ));
        assert!(parse_timestamp(&RawTimestamp::Unix(f64::NAN)).is_err());
    }

    #[test]
    fn test_event_kind_round_trip() {
        for kind in ["commit", "PushEvent", "IssuesEvent", "GollumEvent"] {
            assert_eq!(EventKind::parse(kind).as_str(), kind);
        }
        assert_eq!(
            EventKind::parse("GollumEvent"),
            EventKind::Other("GollumEvent".to_string())
        );
    }

    #[test]
    fn test_ingest_skips_and_counts_malformed() {
        let mut catalog = EventCatalog::new();
        let mut missing_actor = RawEvent::new("x", vec![], 0i64, "commit");
        missing_actor.actor = None;
        let mut unknown_actor = RawEvent::new("", vec!["a.rs".into()], 5i64, "commit");
        unknown_actor.unknown_actor_id = Some(9);

        let raw = vec![
            RawEvent::new("alice", vec!["a.rs".into()], 10i64, "commit"),
            RawEvent::new("bob", vec![], "not-a-time", "commit"),
            missing_actor,
            unknown_actor,
            RawEvent::new("carol", vec!["a.rs".into(), "b.rs".into()], 20i64, "commit"),
        ];

        let (events, report) = catalog.ingest(raw);

        assert_eq!(events.len(), 2);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.invalid_timestamp, 1);
        assert_eq!(report.missing_actor, 1);
        assert_eq!(report.unknown_actor, 1);
        assert_eq!(report.skipped(), 3);

        // bob was rejected before registration
        assert_eq!(catalog.actor_count(), 2);
        assert_eq!(catalog.actors().names(), &["alice", "carol"]);
        assert_eq!(events[1].subjects(), &[SubjectId(0), SubjectId(1)]);
    }

    #[test]
    fn test_preregistered_actor_order() {
        let mut catalog = EventCatalog::with_actors(["zed", "amy"]);
        let event = catalog
            .resolve(RawEvent::new("amy", vec![], 0i64, "commit"))
            .unwrap();
        assert_eq!(event.actor(), ActorId(1));
    }

    #[test]
    fn test_record_requires_registered_actor() {
        let mut catalog = EventCatalog::with_actors(["amy"]);
        let err = catalog
            .record(
                ActorId(3),
                &["f"],
                Utc::now(),
                EventKind::Commit,
                serde_json::Value::Null,
            )
            .unwrap_err();
        assert_eq!(err, RecordError::UnknownActor(3));
    }
}
