//! Per-period event-kind tables.
//!
//! A roll-up counts events per subject and kind within a calendar period,
//! then ranks subjects by how varied (`NumEvents`) and how large
//! (`TotalEvents`) their activity was.

use crate::core::bucketing::ReferenceZone;
use crate::core::event::{EventCatalog, EventRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Calendar period a roll-up groups by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Daily,
    /// Monday-based week of year, `%Y-%W`
    Weekly,
    Monthly,
}

impl Granularity {
    /// Period key of `date`.
    pub fn key(&self, date: NaiveDate) -> String {
        let format = match self {
            Granularity::Daily => "%Y-%m-%d",
            Granularity::Weekly => "%Y-%W",
            Granularity::Monthly => "%Y-%m",
        };
        date.format(format).to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown granularity: {0} (expected daily, weekly or monthly)")]
pub struct UnknownGranularity(pub String);

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            _ => Err(UnknownGranularity(s.to_string())),
        }
    }
}

/// Event counts of one subject within one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRow {
    pub subject: String,
    /// Kind → count
    pub counts: BTreeMap<String, u64>,
    #[serde(rename = "TotalEvents")]
    pub total_events: u64,
    /// Distinct kinds with a nonzero count
    #[serde(rename = "NumEvents")]
    pub num_events: usize,
}

impl RollupRow {
    fn new(subject: String, counts: BTreeMap<String, u64>) -> Self {
        let total_events = counts.values().sum();
        let num_events = counts.values().filter(|&&c| c > 0).count();
        Self {
            subject,
            counts,
            total_events,
            num_events,
        }
    }
}

/// Period key → ranked rows.
pub type RollupTable = BTreeMap<String, Vec<RollupRow>>;

/// Builds roll-up tables.
#[derive(Debug, Clone, Default)]
pub struct Rollup {
    granularity: Granularity,
    zone: ReferenceZone,
    period_filter: Option<String>,
}

impl Rollup {
    pub fn new(granularity: Granularity, zone: ReferenceZone) -> Self {
        Self {
            granularity,
            zone,
            period_filter: None,
        }
    }

    /// Only keep periods whose key contains `pattern` (e.g. `2020-03`).
    pub fn with_period_filter(mut self, pattern: impl Into<String>) -> Self {
        self.period_filter = Some(pattern.into());
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    fn keeps(&self, period: &str) -> bool {
        self.period_filter
            .as_deref()
            .map_or(true, |pattern| period.contains(pattern))
    }

    /// Count events per period, subject and kind.
    ///
    /// An event counts once for each of its subjects. Events without a
    /// subject are not counted.
    pub fn build(&self, events: &[EventRecord], catalog: &EventCatalog) -> RollupTable {
        let mut counts: BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>> = BTreeMap::new();

        for event in events {
            let period = self.granularity.key(self.zone.date_of(event.timestamp()));
            if !self.keeps(&period) {
                continue;
            }
            for &subject in event.subjects() {
                let Some(name) = catalog.subject_name(subject) else {
                    continue;
                };
                *counts
                    .entry(period.clone())
                    .or_default()
                    .entry(name.to_string())
                    .or_default()
                    .entry(event.kind().as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        counts
            .into_iter()
            .map(|(period, subjects)| {
                let mut rows: Vec<RollupRow> = subjects
                    .into_iter()
                    .map(|(subject, kinds)| RollupRow::new(subject, kinds))
                    .collect();
                rank(&mut rows);
                (period, rows)
            })
            .collect()
    }
}

/// Rank subjects over every event regardless of period.
pub fn rank_subjects(events: &[EventRecord], catalog: &EventCatalog) -> Vec<RollupRow> {
    let mut counts: BTreeMap<&str, BTreeMap<String, u64>> = BTreeMap::new();
    for event in events {
        for &subject in event.subjects() {
            if let Some(name) = catalog.subject_name(subject) {
                *counts
                    .entry(name)
                    .or_default()
                    .entry(event.kind().as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    let mut rows: Vec<RollupRow> = counts
        .into_iter()
        .map(|(subject, kinds)| RollupRow::new(subject.to_string(), kinds))
        .collect();
    rank(&mut rows);
    rows
}

/// `(NumEvents, TotalEvents)` descending, ties by subject name.
pub fn rank(rows: &mut [RollupRow]) {
    rows.sort_by(|a, b| {
        (Reverse(a.num_events), Reverse(a.total_events), &a.subject).cmp(&(
            Reverse(b.num_events),
            Reverse(b.total_events),
            &b.subject,
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::RawEvent;

    fn gh(repo: &str, kind: &str, at: &str) -> RawEvent {
        RawEvent::new("someone", vec![repo.to_string()], at, kind)
    }

    fn fixture() -> (Vec<EventRecord>, EventCatalog) {
        let mut catalog = EventCatalog::new();
        let (events, _) = catalog.ingest(vec![
            gh("busy/one", "PushEvent", "2020-03-02T01:00:00Z"),
            gh("busy/one", "PushEvent", "2020-03-02T02:00:00Z"),
            gh("busy/one", "PushEvent", "2020-03-02T03:00:00Z"),
            gh("varied/two", "PushEvent", "2020-03-02T04:00:00Z"),
            gh("varied/two", "IssuesEvent", "2020-03-02T05:00:00Z"),
            gh("alpha/three", "PushEvent", "2020-03-02T06:00:00Z"),
            gh("alpha/three", "IssuesEvent", "2020-03-02T07:00:00Z"),
            gh("busy/one", "PushEvent", "2020-03-09T01:00:00Z"),
            gh("busy/one", "PushEvent", "2020-04-01T01:00:00Z"),
        ]);
        (events, catalog)
    }

    #[test]
    fn test_granularity_keys() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 9).unwrap();
        assert_eq!(Granularity::Daily.key(date), "2020-03-09");
        assert_eq!(Granularity::Weekly.key(date), "2020-10");
        assert_eq!(Granularity::Monthly.key(date), "2020-03");
        assert_eq!("Weekly".parse::<Granularity>().unwrap(), Granularity::Weekly);
        assert!("hourly".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_daily_ranking() {
        let (events, catalog) = fixture();
        let table = Rollup::new(Granularity::Daily, ReferenceZone::Utc).build(&events, &catalog);

        let day = &table["2020-03-02"];
        let order: Vec<&str> = day.iter().map(|r| r.subject.as_str()).collect();
        // Two kinds beat three pushes; equal rows fall back to name order
        assert_eq!(order, vec!["alpha/three", "varied/two", "busy/one"]);

        assert_eq!(day[2].total_events, 3);
        assert_eq!(day[2].num_events, 1);
        assert_eq!(day[0].counts["IssuesEvent"], 1);
    }

    #[test]
    fn test_monthly_totals_and_filter() {
        let (events, catalog) = fixture();
        let monthly = Rollup::new(Granularity::Monthly, ReferenceZone::Utc).build(&events, &catalog);
        assert_eq!(monthly.len(), 2);
        let march_busy = monthly["2020-03"]
            .iter()
            .find(|r| r.subject == "busy/one")
            .unwrap();
        assert_eq!(march_busy.total_events, 4);

        let filtered = Rollup::new(Granularity::Daily, ReferenceZone::Utc)
            .with_period_filter("2020-03")
            .build(&events, &catalog);
        assert_eq!(
            filtered.keys().cloned().collect::<Vec<_>>(),
            vec!["2020-03-02".to_string(), "2020-03-09".to_string()]
        );
    }

    #[test]
    fn test_rank_subjects_over_all_periods() {
        let (events, catalog) = fixture();
        let rows = rank_subjects(&events, &catalog);

        let order: Vec<&str> = rows.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(order, vec!["alpha/three", "varied/two", "busy/one"]);
        assert_eq!(rows[2].total_events, 5);
    }

    #[test]
    fn test_row_serialization_names() {
        let row = RollupRow::new("r".to_string(), BTreeMap::from([("PushEvent".to_string(), 2)]));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["TotalEvents"], 2);
        assert_eq!(json["NumEvents"], 1);
    }
}
