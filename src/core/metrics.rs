//! Incremental per-subject, per-day metrics.
//!
//! Counters and running averages are folded one event at a time and never
//! recomputed from history. Partial aggregators built over disjoint
//! partitions are combined with [`MetricsAggregator::merge`].

use crate::core::bucketing::ReferenceZone;
use crate::core::dispatch::{classify, MetricUpdate};
use crate::core::event::EventRecord;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Names of the tracked metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricName {
    PullRequestOpenRate,
    PullRequestCloseRate,
    PullRequestMergeRate,
    PullRequestRejectionRate,
    IssueOpenRate,
    BugOpenRate,
    CriticalBugOpenRate,
    EnhancementRequestRate,
    IssueResolutionRate,
    AvgIssueCloseTime,
    BugCloseRate,
    CriticalBugCloseRate,
    CommitRate,
}

impl MetricName {
    pub const ALL: [MetricName; 13] = [
        MetricName::PullRequestOpenRate,
        MetricName::PullRequestCloseRate,
        MetricName::PullRequestMergeRate,
        MetricName::PullRequestRejectionRate,
        MetricName::IssueOpenRate,
        MetricName::BugOpenRate,
        MetricName::CriticalBugOpenRate,
        MetricName::EnhancementRequestRate,
        MetricName::IssueResolutionRate,
        MetricName::AvgIssueCloseTime,
        MetricName::BugCloseRate,
        MetricName::CriticalBugCloseRate,
        MetricName::CommitRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PullRequestOpenRate => "PullRequestOpenRate",
            MetricName::PullRequestCloseRate => "PullRequestCloseRate",
            MetricName::PullRequestMergeRate => "PullRequestMergeRate",
            MetricName::PullRequestRejectionRate => "PullRequestRejectionRate",
            MetricName::IssueOpenRate => "IssueOpenRate",
            MetricName::BugOpenRate => "BugOpenRate",
            MetricName::CriticalBugOpenRate => "CriticalBugOpenRate",
            MetricName::EnhancementRequestRate => "EnhancementRequestRate",
            MetricName::IssueResolutionRate => "IssueResolutionRate",
            MetricName::AvgIssueCloseTime => "AvgIssueCloseTime",
            MetricName::BugCloseRate => "BugCloseRate",
            MetricName::CriticalBugCloseRate => "CriticalBugCloseRate",
            MetricName::CommitRate => "CommitRate",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricName {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// Address of one metric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub subject: String,
    pub date: NaiveDate,
    pub metric: MetricName,
}

impl MetricKey {
    pub fn new(subject: impl Into<String>, date: NaiveDate, metric: MetricName) -> Self {
        Self {
            subject: subject.into(),
            date,
            metric,
        }
    }
}

/// Count and arithmetic mean of the values observed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMetric {
    pub count: u64,
    pub average: f64,
}

impl RunningMetric {
    /// Fold in one value. The first value becomes the average.
    pub fn record(&mut self, value: f64) {
        let previous = self.count as f64;
        self.count += 1;
        self.average = (self.average * previous + value) / self.count as f64;
    }

    /// Combine with a metric observed over a disjoint set of values.
    pub fn combine(&mut self, other: &RunningMetric) {
        let total = self.count + other.count;
        if total == 0 {
            return;
        }
        self.average = (self.average * self.count as f64 + other.average * other.count as f64)
            / total as f64;
        self.count = total;
    }
}

/// How `merge` resolves keys present on both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Counters add, running metrics combine by weighted mean
    #[default]
    Combine,
    PreferExisting,
    PreferIncoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown merge policy: {0} (expected combine, prefer_existing or prefer_incoming)")]
pub struct UnknownMergePolicy(pub String);

impl FromStr for MergePolicy {
    type Err = UnknownMergePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "combine" => Ok(MergePolicy::Combine),
            "prefer_existing" => Ok(MergePolicy::PreferExisting),
            "prefer_incoming" => Ok(MergePolicy::PreferIncoming),
            _ => Err(UnknownMergePolicy(s.to_string())),
        }
    }
}

/// `subject → date → metric → value`
pub type MetricSnapshot = BTreeMap<String, BTreeMap<String, BTreeMap<MetricName, f64>>>;

/// Keyed counters and running averages.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    zone: ReferenceZone,
    counters: BTreeMap<MetricKey, u64>,
    running: BTreeMap<MetricKey, RunningMetric>,
    fallback_durations: u64,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator that dates events in `zone`.
    pub fn with_zone(zone: ReferenceZone) -> Self {
        Self {
            zone,
            ..Self::default()
        }
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    fn counter_entry(&mut self, key: MetricKey) -> &mut u64 {
        self.counters.entry(key).or_insert(0)
    }

    fn running_entry(&mut self, key: MetricKey) -> &mut RunningMetric {
        self.running.entry(key).or_default()
    }

    pub fn increment(&mut self, key: MetricKey) {
        self.add(key, 1);
    }

    pub fn add(&mut self, key: MetricKey, n: u64) {
        *self.counter_entry(key) += n;
    }

    /// Fold an arbitrary value into the running metric at `key`.
    pub fn record_value(&mut self, key: MetricKey, value: f64) {
        self.running_entry(key).record(value);
    }

    /// Fold a duration, in whole days, into the running metric at `key`.
    ///
    /// An unknown or negative duration is recorded as zero and counted in
    /// [`fallback_durations`](Self::fallback_durations).
    pub fn record_duration(&mut self, key: MetricKey, duration: Option<Duration>) {
        let days = match duration {
            Some(d) if d >= Duration::zero() => d.num_days() as f64,
            other => {
                self.fallback_durations += 1;
                tracing::debug!(
                    subject = %key.subject,
                    metric = %key.metric,
                    duration = ?other,
                    "duration unavailable, recording zero"
                );
                0.0
            }
        };
        self.record_value(key, days);
    }

    pub fn counter(&self, key: &MetricKey) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn running(&self, key: &MetricKey) -> Option<&RunningMetric> {
        self.running.get(key)
    }

    /// Durations that fell back to zero.
    pub fn fallback_durations(&self) -> u64 {
        self.fallback_durations
    }

    /// Number of distinct keys holding a value.
    pub fn len(&self) -> usize {
        self.counters.len() + self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.running.is_empty()
    }

    /// Apply one update under `subject` on `date`.
    pub fn apply(&mut self, subject: &str, date: NaiveDate, update: MetricUpdate) {
        match update {
            MetricUpdate::Increment(metric) => self.increment(MetricKey::new(subject, date, metric)),
            MetricUpdate::Add(metric, n) => self.add(MetricKey::new(subject, date, metric), n),
            MetricUpdate::Duration(metric, d) => {
                self.record_duration(MetricKey::new(subject, date, metric), d)
            }
        }
    }

    /// Classify an event and apply its updates under `subject`. Returns the
    /// number of updates applied; zero for kinds with no metrics.
    pub fn observe(&mut self, subject: &str, event: &EventRecord) -> usize {
        let date = self.zone.date_of(event.timestamp());
        let updates = classify(event.kind(), event.payload());
        let applied = updates.len();
        for update in updates {
            self.apply(subject, date, update);
        }
        applied
    }

    /// Fold another aggregator into this one.
    pub fn merge(&mut self, other: MetricsAggregator, policy: MergePolicy) {
        for (key, value) in other.counters {
            match policy {
                MergePolicy::Combine => *self.counter_entry(key) += value,
                MergePolicy::PreferExisting => {
                    self.counters.entry(key).or_insert(value);
                }
                MergePolicy::PreferIncoming => {
                    self.counters.insert(key, value);
                }
            }
        }
        for (key, metric) in other.running {
            match policy {
                MergePolicy::Combine => self.running_entry(key).combine(&metric),
                MergePolicy::PreferExisting => {
                    self.running.entry(key).or_insert(metric);
                }
                MergePolicy::PreferIncoming => {
                    self.running.insert(key, metric);
                }
            }
        }
        self.fallback_durations += other.fallback_durations;
    }

    /// Nested view of every value. Dates are ISO `YYYY-MM-DD`; running
    /// metrics report their average.
    pub fn snapshot(&self) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new();
        let counters = self.counters.iter().map(|(k, &v)| (k, v as f64));
        let averages = self.running.iter().map(|(k, m)| (k, m.average));
        for (key, value) in counters.chain(averages) {
            snapshot
                .entry(key.subject.clone())
                .or_default()
                .entry(key.date.format("%Y-%m-%d").to_string())
                .or_default()
                .insert(key.metric, value);
        }
        snapshot
    }
}

/// Aggregate independent partitions on scoped worker threads.
///
/// Each worker owns a private aggregator; partial results come back over a
/// channel and are folded together under `policy`. Only
/// [`MergePolicy::Combine`] is order-independent.
pub fn aggregate_partitions<P, F>(
    partitions: Vec<P>,
    zone: ReferenceZone,
    policy: MergePolicy,
    worker: F,
) -> MetricsAggregator
where
    P: Send,
    F: Fn(P) -> MetricsAggregator + Sync,
{
    let mut total = MetricsAggregator::with_zone(zone);
    if partitions.is_empty() {
        return total;
    }

    let (tx, rx) = crossbeam_channel::bounded(partitions.len());
    let worker = &worker;

    std::thread::scope(|scope| {
        for (index, partition) in partitions.into_iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                let partial = worker(partition);
                tracing::debug!(partition = index, keys = partial.len(), "partition aggregated");
                // The receiver outlives every worker
                let _ = tx.send(partial);
            });
        }
        drop(tx);

        for partial in rx.iter() {
            total.merge(partial, policy);
        }
    });

    total
}
