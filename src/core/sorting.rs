//! Chronological ordering of events.

use crate::core::event::{parse_timestamp, EventRecord, RecordError};
use crate::source::types::RawEvent;

/// Order events by timestamp. Ties keep their input order.
pub fn sort_events(mut events: Vec<EventRecord>) -> Vec<EventRecord> {
    // sort_by_key is stable
    events.sort_by_key(EventRecord::timestamp);
    events
}

/// Order raw records by their resolved timestamp. Ties keep their input
/// order.
///
/// Unlike ingest, this is all-or-nothing: the first record whose timestamp
/// cannot be resolved fails the whole call.
pub fn sort_raw_events(raw: Vec<RawEvent>) -> Result<Vec<RawEvent>, RecordError> {
    let mut keyed = raw
        .into_iter()
        .map(|record| parse_timestamp(&record.timestamp).map(|t| (t, record)))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by_key(|(t, _)| *t);
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}

/// Whether events are in non-decreasing timestamp order.
pub fn is_chronological(events: &[EventRecord]) -> bool {
    events
        .windows(2)
        .all(|pair| pair[0].timestamp() <= pair[1].timestamp())
}
