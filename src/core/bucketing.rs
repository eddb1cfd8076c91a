//! Grouping events by calendar day.
//!
//! The calendar day of an event depends on the reference time zone. UTC is
//! the default because it gives the same buckets on every machine; `Local`
//! follows the host's zone and is only reproducible on hosts configured the
//! same way.

use crate::core::event::EventRecord;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

/// Zone used to derive calendar dates from instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceZone {
    #[default]
    Utc,
    /// Host time zone; results differ between machines
    Local,
    Named(Tz),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown time zone: {0}")]
pub struct UnknownTimeZone(pub String);

impl ReferenceZone {
    /// Calendar date of `instant` in this zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            ReferenceZone::Utc => instant.date_naive(),
            ReferenceZone::Local => instant.with_timezone(&chrono::Local).date_naive(),
            ReferenceZone::Named(tz) => instant.with_timezone(tz).date_naive(),
        }
    }
}

impl FromStr for ReferenceZone {
    type Err = UnknownTimeZone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "utc" | "UTC" => Ok(ReferenceZone::Utc),
            "local" | "Local" => Ok(ReferenceZone::Local),
            name => name
                .parse::<Tz>()
                .map(ReferenceZone::Named)
                .map_err(|_| UnknownTimeZone(name.to_string())),
        }
    }
}

impl fmt::Display for ReferenceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceZone::Utc => f.write_str("UTC"),
            ReferenceZone::Local => f.write_str("local"),
            ReferenceZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Events that happened on one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub events: Vec<EventRecord>,
}

/// Day buckets keyed by date.
#[derive(Debug, Clone, Default)]
pub struct DayBuckets {
    buckets: BTreeMap<NaiveDate, DayBucket>,
}

impl DayBuckets {
    /// Distinct dates, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.buckets.keys().copied().collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.buckets.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.buckets.keys().next_back().copied()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DayBucket> {
        self.buckets.get(&date)
    }

    /// Buckets whose date falls in `range`, ascending.
    pub fn range(&self, range: RangeInclusive<NaiveDate>) -> impl Iterator<Item = &DayBucket> {
        self.buckets.range(range).map(|(_, bucket)| bucket)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DayBucket> {
        self.buckets.values()
    }

    /// Number of distinct days.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of bucketed events.
    pub fn event_count(&self) -> usize {
        self.buckets.values().map(|b| b.events.len()).sum()
    }
}

/// Splits events into day buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayBucketer {
    zone: ReferenceZone,
}

impl DayBucketer {
    pub fn new(zone: ReferenceZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    /// Bucket events by calendar day.
    ///
    /// Every event lands in exactly one bucket. Events keep their relative
    /// order inside a bucket, so chronologically sorted input yields sorted
    /// buckets.
    pub fn bucket(&self, events: Vec<EventRecord>) -> DayBuckets {
        let mut buckets: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();
        for event in events {
            let date = self.zone.date_of(event.timestamp());
            buckets
                .entry(date)
                .or_insert_with(|| DayBucket {
                    date,
                    events: Vec::new(),
                })
                .events
                .push(event);
        }

        tracing::debug!(days = buckets.len(), zone = %self.zone, "bucketed events");
        DayBuckets { buckets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::EventCatalog;
    use crate::source::types::RawEvent;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn events(stamps: &[&str]) -> Vec<EventRecord> {
        let mut catalog = EventCatalog::new();
        let (events, report) = catalog.ingest(
            stamps
                .iter()
                .map(|s| RawEvent::new("dev", vec![], *s, "commit")),
        );
        assert_eq!(report.skipped(), 0);
        events
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!("UTC".parse::<ReferenceZone>().unwrap(), ReferenceZone::Utc);
        assert_eq!("local".parse::<ReferenceZone>().unwrap(), ReferenceZone::Local);
        assert_eq!(
            "America/New_York".parse::<ReferenceZone>().unwrap(),
            ReferenceZone::Named(chrono_tz::America::New_York)
        );
        assert!("Mars/Olympus".parse::<ReferenceZone>().is_err());
    }

    #[test]
    fn test_every_event_in_exactly_one_bucket() {
        let buckets = DayBucketer::default().bucket(events(&[
            "2020-05-01T08:00:00Z",
            "2020-05-01T23:59:59Z",
            "2020-05-03T00:00:00Z",
            "2020-05-02T12:00:00Z",
        ]));

        assert_eq!(buckets.event_count(), 4);
        assert_eq!(
            buckets.dates(),
            vec![date(2020, 5, 1), date(2020, 5, 2), date(2020, 5, 3)]
        );
        assert_eq!(buckets.get(date(2020, 5, 1)).unwrap().events.len(), 2);
        for bucket in buckets.iter() {
            for event in &bucket.events {
                assert_eq!(event.timestamp().date_naive(), bucket.date);
            }
        }
    }

    #[test]
    fn test_named_zone_shifts_boundary_days() {
        let input = events(&["2020-05-01T02:00:00Z"]);

        let utc = DayBucketer::new(ReferenceZone::Utc).bucket(input.clone());
        assert_eq!(utc.dates(), vec![date(2020, 5, 1)]);

        let ny = DayBucketer::new(ReferenceZone::Named(chrono_tz::America::New_York)).bucket(input);
        assert_eq!(ny.dates(), vec![date(2020, 4, 30)]);
    }

    #[test]
    fn test_empty_input() {
        let buckets = DayBucketer::default().bucket(Vec::new());
        assert!(buckets.is_empty());
        assert_eq!(buckets.first_date(), None);
        assert_eq!(buckets.last_date(), None);
    }

    #[test]
    fn test_range_lookup() {
        let buckets = DayBucketer::default().bucket(events(&[
            "2020-05-01T00:00:00Z",
            "2020-05-04T00:00:00Z",
            "2020-05-09T00:00:00Z",
        ]));
        let in_range: Vec<NaiveDate> = buckets
            .range(date(2020, 5, 2)..=date(2020, 5, 9))
            .map(|b| b.date)
            .collect();
        assert_eq!(in_range, vec![date(2020, 5, 4), date(2020, 5, 9)]);
    }
}
