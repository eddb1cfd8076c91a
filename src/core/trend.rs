//! Descriptive statistics over metric snapshots.

use crate::core::metrics::{MetricName, MetricSnapshot};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeMap;

/// Summary of one metric across subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub max: f64,
}

/// Describe a set of values. `None` when empty.
pub fn describe(values: &[f64]) -> Option<MetricSummary> {
    if values.is_empty() {
        return None;
    }

    let mean = values.iter().mean();
    let std = if values.len() > 1 {
        Some(values.iter().std_dev())
    } else {
        None
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut data = Data::new(values.to_vec());
    Some(MetricSummary {
        count: values.len(),
        mean,
        std,
        min,
        p25: data.lower_quartile(),
        median: data.median(),
        p75: data.upper_quartile(),
        max,
    })
}

fn values_on(
    snapshot: &MetricSnapshot,
    date: &str,
    metric: MetricName,
    subjects: Option<&[String]>,
) -> Vec<f64> {
    snapshot
        .iter()
        .filter(|(subject, _)| subjects.map_or(true, |wanted| wanted.contains(*subject)))
        .filter_map(|(_, dates)| dates.get(date)?.get(&metric).copied())
        .collect()
}

/// Summarise `metric` on `date` across subjects. Subjects lacking the
/// metric are skipped; `subjects` restricts the set when given.
pub fn summarize(
    snapshot: &MetricSnapshot,
    date: &str,
    metric: MetricName,
    subjects: Option<&[String]>,
) -> Option<MetricSummary> {
    describe(&values_on(snapshot, date, metric, subjects))
}

/// Per-day summaries of `metric` for every date present in the snapshot.
pub fn daily_trend(
    snapshot: &MetricSnapshot,
    metric: MetricName,
    subjects: Option<&[String]>,
) -> BTreeMap<String, MetricSummary> {
    let dates: std::collections::BTreeSet<&String> =
        snapshot.values().flat_map(|dates| dates.keys()).collect();

    dates
        .into_iter()
        .filter_map(|date| {
            summarize(snapshot, date, metric, subjects).map(|summary| (date.clone(), summary))
        })
        .collect()
}
