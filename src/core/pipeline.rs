//! End-to-end aggregation runs.
//!
//! ```text
//! raw ─▶ ingest ─▶ lookback ─▶ sort ─▶ bucket ─┬▶ windows ─▶ interaction records
//!                                              └▶ metrics (per-month partitions)
//! ```

use crate::config::Config;
use crate::core::bucketing::{DayBucketer, ReferenceZone};
use crate::core::event::{EventCatalog, EventRecord, IngestReport};
use crate::core::interaction::WindowRecord;
use crate::core::metrics::{aggregate_partitions, MergePolicy, MetricsAggregator};
use crate::core::rollup::rank_subjects;
use crate::core::sorting::sort_events;
use crate::core::windowing::{WindowBuilder, WindowError};
use crate::source::types::RawEvent;
use chrono::{DateTime, Datelike, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Seconds in one twelfth of a 365-day year.
const SECONDS_PER_MONTH: i64 = 365 * 86_400 / 12;

/// Oldest instant kept by a lookback of `months` ending at `reference`.
pub fn lookback_cutoff(reference: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    reference - Duration::seconds(i64::from(months) * SECONDS_PER_MONTH)
}

/// Keep events at or after `cutoff`. Returns the kept events and the number
/// dropped.
pub fn apply_lookback(events: Vec<EventRecord>, cutoff: DateTime<Utc>) -> (Vec<EventRecord>, usize) {
    let before = events.len();
    let kept: Vec<EventRecord> = events
        .into_iter()
        .filter(|e| e.timestamp() >= cutoff)
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Split events into calendar-month partitions, oldest first.
pub fn partition_by_month(events: Vec<EventRecord>, zone: ReferenceZone) -> Vec<Vec<EventRecord>> {
    let mut months: BTreeMap<(i32, u32), Vec<EventRecord>> = BTreeMap::new();
    for event in events {
        let date = zone.date_of(event.timestamp());
        months
            .entry((date.year(), date.month()))
            .or_default()
            .push(event);
    }
    months.into_values().collect()
}

/// Which repositories an incremental run aggregates.
///
/// The allow-list applies first; `top_k` then keeps the most active of the
/// remaining repositories, ranked like a roll-up over the whole input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySelection {
    pub repositories: Vec<String>,
    pub top_k: Option<usize>,
}

impl RepositorySelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(repositories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            repositories: repositories.into_iter().map(Into::into).collect(),
            top_k: None,
        }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.repositories.is_empty() && self.top_k.is_none()
    }

    /// Names of the selected repositories, or `None` when every repository
    /// is kept.
    pub fn resolve(&self, events: &[EventRecord], catalog: &EventCatalog) -> Option<BTreeSet<String>> {
        if self.is_unrestricted() {
            return None;
        }

        let allowed = |name: &str| {
            self.repositories.is_empty() || self.repositories.iter().any(|r| r == name)
        };
        let ranked = rank_subjects(events, catalog)
            .into_iter()
            .map(|row| row.subject)
            .filter(|name| allowed(name.as_str()));

        Some(match self.top_k {
            Some(k) => ranked.take(k).collect(),
            None => ranked.collect(),
        })
    }
}

/// Events after ingest, lookback and sorting.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub events: Vec<EventRecord>,
    pub report: IngestReport,
    pub lookback_dropped: usize,
}

/// Output of a window-mode run.
#[derive(Debug, Clone)]
pub struct GraphRun {
    /// Actor identities in canonical index order
    pub actors: Vec<String>,
    pub records: Vec<WindowRecord>,
    pub report: IngestReport,
    pub lookback_dropped: usize,
}

/// Output of an incremental-mode run.
#[derive(Debug, Clone)]
pub struct MetricsRun {
    pub aggregator: MetricsAggregator,
    pub report: IngestReport,
    pub lookback_dropped: usize,
    pub partitions: usize,
    /// Repositories aggregated, when a selection narrowed them
    pub selected: Option<BTreeSet<String>>,
}

/// Configured aggregation stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    builder: WindowBuilder,
    bucketer: DayBucketer,
    time_budget_months: Option<u32>,
    merge_policy: MergePolicy,
    selection: RepositorySelection,
}

impl Pipeline {
    pub fn new(builder: WindowBuilder, zone: ReferenceZone) -> Self {
        Self {
            builder,
            bucketer: DayBucketer::new(zone),
            time_budget_months: None,
            merge_policy: MergePolicy::default(),
            selection: RepositorySelection::all(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, WindowError> {
        let builder = WindowBuilder::new(config.window_size, config.stride)?
            .with_convention(config.stride_convention)
            .with_boundary(config.boundary)
            .ignore_empty(config.ignore_empty_windows);

        Ok(Self::new(builder, config.time_zone)
            .with_time_budget(config.time_budget_months)
            .with_merge_policy(config.merge_policy)
            .with_selection(RepositorySelection {
                repositories: config.repositories.clone(),
                top_k: config.top_k,
            }))
    }

    pub fn with_time_budget(mut self, months: Option<u32>) -> Self {
        self.time_budget_months = months;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_selection(mut self, selection: RepositorySelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> &RepositorySelection {
        &self.selection
    }

    pub fn builder(&self) -> WindowBuilder {
        self.builder
    }

    pub fn zone(&self) -> ReferenceZone {
        self.bucketer.zone()
    }

    /// Ingest, apply the lookback horizon relative to `reference`, and sort.
    pub fn prepare<I>(&self, catalog: &mut EventCatalog, raw: I, reference: DateTime<Utc>) -> Prepared
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let (events, report) = catalog.ingest(raw);

        let (events, lookback_dropped) = match self.time_budget_months {
            Some(months) => apply_lookback(events, lookback_cutoff(reference, months)),
            None => (events, 0),
        };
        if lookback_dropped > 0 {
            tracing::info!(dropped = lookback_dropped, "dropped events outside lookback horizon");
        }

        Prepared {
            events: sort_events(events),
            report,
            lookback_dropped,
        }
    }

    /// Build one interaction record per emitted window.
    pub fn run_graph<I>(&self, catalog: &mut EventCatalog, raw: I, reference: DateTime<Utc>) -> GraphRun
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let prepared = self.prepare(catalog, raw, reference);
        let buckets = self.bucketer.bucket(prepared.events);
        let population = catalog.actor_count();

        let records: Vec<WindowRecord> = self
            .builder
            .windows(&buckets)
            .map(|window| WindowRecord::from_window(&window, population))
            .collect();

        tracing::info!(
            windows = records.len(),
            actors = population,
            days = buckets.len(),
            "interaction graphs built"
        );

        GraphRun {
            actors: catalog.actors().names().to_vec(),
            records,
            report: prepared.report,
            lookback_dropped: prepared.lookback_dropped,
        }
    }

    /// Fold events into per-subject daily metrics, one worker per month.
    pub fn run_metrics<I>(&self, catalog: &mut EventCatalog, raw: I, reference: DateTime<Utc>) -> MetricsRun
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let prepared = self.prepare(catalog, raw, reference);
        let zone = self.zone();
        let catalog: &EventCatalog = catalog;

        let selected = self.selection.resolve(&prepared.events, catalog);
        if let Some(names) = &selected {
            tracing::info!(repositories = names.len(), "restricting metrics to selected repositories");
        }
        let keep = |name: &str| selected.as_ref().map_or(true, |names| names.contains(name));

        let partitions = partition_by_month(prepared.events, zone);
        let partition_count = partitions.len();

        let aggregator = aggregate_partitions(partitions, zone, self.merge_policy, |events| {
            let mut aggregator = MetricsAggregator::with_zone(zone);
            for event in &events {
                for &subject in event.subjects() {
                    match catalog.subject_name(subject) {
                        Some(name) if keep(name) => {
                            aggregator.observe(name, event);
                        }
                        _ => {}
                    }
                }
            }
            aggregator
        });

        if aggregator.fallback_durations() > 0 {
            tracing::warn!(
                count = aggregator.fallback_durations(),
                "issue close times that could not be computed were recorded as zero"
            );
        }

        MetricsRun {
            aggregator,
            report: prepared.report,
            lookback_dropped: prepared.lookback_dropped,
            partitions: partition_count,
            selected,
        }
    }
}
