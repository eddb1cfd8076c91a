//! Contributor interaction graphs.
//!
//! Two actors interact once for every distinct subject both touched inside a
//! window, no matter how many events each of them produced on it. Activity
//! counts, on the other hand, count every event.

use crate::core::event::{ActorId, SubjectId};
use crate::core::windowing::Window;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use std::collections::{BTreeMap, BTreeSet};

/// Symmetric actor × actor co-occurrence matrix with a zero diagonal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionGraph {
    matrix: Vec<Vec<u32>>,
}

impl InteractionGraph {
    /// An all-zero graph over `size` actors.
    pub fn zeros(size: usize) -> Self {
        Self {
            matrix: vec![vec![0; size]; size],
        }
    }

    pub fn size(&self) -> usize {
        self.matrix.len()
    }

    pub fn get(&self, a: ActorId, b: ActorId) -> u32 {
        self.matrix[a.index()][b.index()]
    }

    pub fn rows(&self) -> &[Vec<u32>] {
        &self.matrix
    }

    pub fn into_rows(self) -> Vec<Vec<u32>> {
        self.matrix
    }

    /// Record one shared subject between two distinct actors.
    fn connect(&mut self, a: ActorId, b: ActorId) {
        debug_assert_ne!(a, b);
        self.matrix[a.index()][b.index()] += 1;
        self.matrix[b.index()][a.index()] += 1;
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.size();
        (0..n).all(|i| (0..n).all(|j| self.matrix[i][j] == self.matrix[j][i]))
    }

    pub fn has_zero_diagonal(&self) -> bool {
        self.matrix.iter().enumerate().all(|(i, row)| row[i] == 0)
    }

    /// Sum over unordered pairs.
    pub fn total_interactions(&self) -> u64 {
        let n = self.size();
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .map(|(i, j)| u64::from(self.matrix[i][j]))
            .sum()
    }

    /// Number of distinct actors `actor` interacted with.
    pub fn degree(&self, actor: ActorId) -> usize {
        self.matrix[actor.index()].iter().filter(|&&c| c > 0).count()
    }

    /// Median neighbour count over active actors, divided by the number of
    /// active actors and rounded to three decimals.
    ///
    /// `None` when nobody was active.
    pub fn median_degree_ratio(&self, activity: &ActivityVector) -> Option<f64> {
        let active: Vec<ActorId> = activity.active_actors().collect();
        if active.is_empty() {
            return None;
        }
        let degrees: Vec<f64> = active.iter().map(|&a| self.degree(a) as f64).collect();
        let median = Data::new(degrees).median();
        let ratio = median / active.len() as f64;
        Some((ratio * 1000.0).round() / 1000.0)
    }
}

/// Per-actor event counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityVector {
    counts: Vec<u32>,
}

impl ActivityVector {
    pub fn zeros(size: usize) -> Self {
        Self {
            counts: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, actor: ActorId) -> u32 {
        self.counts[actor.index()]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<u32> {
        self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Actors with at least one event.
    pub fn active_actors(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(i, _)| ActorId(i))
    }
}

/// Build the interaction graph and activity vector of a window.
///
/// Both outputs are sized to `population`, the number of actors known to the
/// run, so indices line up across every window of the run. Should a window
/// reference an actor beyond `population`, the outputs grow to include it.
pub fn aggregate_window(
    window: &Window<'_>,
    population: usize,
) -> (InteractionGraph, ActivityVector) {
    let size = window
        .events
        .iter()
        .map(|e| e.actor().index() + 1)
        .max()
        .unwrap_or(0)
        .max(population);

    let mut activity = ActivityVector::zeros(size);
    let mut touched: BTreeMap<SubjectId, BTreeSet<ActorId>> = BTreeMap::new();

    for event in &window.events {
        activity.counts[event.actor().index()] += 1;
        for &subject in event.subjects() {
            touched.entry(subject).or_default().insert(event.actor());
        }
    }

    let mut graph = InteractionGraph::zeros(size);
    for actors in touched.values().filter(|actors| actors.len() > 1) {
        let actors: Vec<ActorId> = actors.iter().copied().collect();
        for (i, &a) in actors.iter().enumerate() {
            for &b in &actors[i + 1..] {
                graph.connect(a, b);
            }
        }
    }

    (graph, activity)
}

/// Sink record for one window.
///
/// Matrix rows and activity entries follow the run's canonical actor index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// First day (ISO date)
    pub first_day: String,
    /// Last day, inclusive (ISO date)
    pub last_day: String,
    pub interaction: Vec<Vec<u32>>,
    pub author_activities: Vec<u32>,
    /// Median neighbour count over active actors / active actors
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub median_degree_ratio: Option<f64>,
}

impl WindowRecord {
    pub fn new(window: &Window<'_>, graph: InteractionGraph, activity: ActivityVector) -> Self {
        let median_degree_ratio = graph.median_degree_ratio(&activity);
        Self {
            first_day: window.first_day.format("%Y-%m-%d").to_string(),
            last_day: window.last_day.format("%Y-%m-%d").to_string(),
            interaction: graph.into_rows(),
            author_activities: activity.into_counts(),
            median_degree_ratio,
        }
    }

    /// Aggregate a window straight into a record.
    pub fn from_window(window: &Window<'_>, population: usize) -> Self {
        let (graph, activity) = aggregate_window(window, population);
        Self::new(window, graph, activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bucketing::DayBucketer;
    use crate::core::event::{EventCatalog, EventRecord};
    use crate::core::windowing::WindowBuilder;
    use crate::source::types::RawEvent;
    use chrono::NaiveDate;

    fn commit(actor: &str, files: &[&str], day: u32) -> RawEvent {
        RawEvent::new(
            actor,
            files.iter().map(|f| f.to_string()).collect(),
            format!("2020-05-{day:02}T10:00:00Z"),
            "commit",
        )
    }

    fn window_of(events: &[EventRecord]) -> Window<'_> {
        Window {
            first_day: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            last_day: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            events: events.iter().collect(),
        }
    }

    #[test]
    fn test_three_actor_scenario() {
        let mut catalog = EventCatalog::with_actors(["A", "B", "C"]);
        let (events, _) = catalog.ingest(vec![
            commit("A", &["f1"], 1),
            commit("B", &["f1"], 1),
            commit("B", &["f2"], 2),
            commit("C", &["f2"], 2),
        ]);
        let buckets = DayBucketer::default().bucket(events);
        let builder = WindowBuilder::new(2, 2).unwrap();

        let windows: Vec<Window<'_>> = builder.windows(&buckets).collect();
        assert_eq!(windows.len(), 1);

        let record = WindowRecord::from_window(&windows[0], catalog.actor_count());
        assert_eq!(record.first_day, "2020-05-01");
        assert_eq!(record.last_day, "2020-05-02");
        assert_eq!(
            record.interaction,
            vec![vec![0, 1, 0], vec![1, 0, 1], vec![0, 1, 0]]
        );
        assert_eq!(record.author_activities, vec![1, 2, 1]);
    }

    #[test]
    fn test_single_actor_many_files() {
        let mut catalog = EventCatalog::new();
        let (events, _) = catalog.ingest(
            ["a", "b", "c", "d", "e"]
                .iter()
                .map(|f| commit("solo", &[f], 1)),
        );
        let (graph, activity) = aggregate_window(&window_of(&events), catalog.actor_count());

        assert_eq!(graph.total_interactions(), 0);
        assert_eq!(activity.counts(), &[5]);
    }

    #[test]
    fn test_co_occurrence_not_multiplicity() {
        let mut catalog = EventCatalog::new();
        let (events, _) = catalog.ingest(vec![
            commit("x", &["f"], 1),
            commit("y", &["f"], 1),
            commit("x", &["f"], 1),
            commit("y", &["f", "g"], 1),
            commit("x", &["g"], 1),
        ]);
        let (graph, activity) = aggregate_window(&window_of(&events), 2);

        // f and g are each shared once
        assert_eq!(graph.get(ActorId(0), ActorId(1)), 2);
        assert_eq!(activity.counts(), &[3, 2]);
    }

    #[test]
    fn test_sized_to_population() {
        let mut catalog = EventCatalog::with_actors(["idle-1", "idle-2", "busy"]);
        let (events, _) = catalog.ingest(vec![commit("busy", &["f"], 1)]);
        let (graph, activity) = aggregate_window(&window_of(&events), catalog.actor_count());

        assert_eq!(graph.size(), 3);
        assert_eq!(activity.counts(), &[0, 0, 1]);
    }

    #[test]
    fn test_empty_window() {
        let (graph, activity) = aggregate_window(&window_of(&[]), 4);
        assert_eq!(graph, InteractionGraph::zeros(4));
        assert_eq!(activity.total(), 0);
        assert_eq!(graph.median_degree_ratio(&activity), None);
    }

    #[test]
    fn test_symmetric_zero_diagonal_and_order_independent() {
        let raw = vec![
            commit("a", &["1", "2", "3"], 1),
            commit("b", &["2", "3"], 1),
            commit("c", &["3", "4"], 1),
            commit("d", &["4", "1"], 1),
            commit("a", &["4"], 1),
            commit("b", &[], 1),
        ];
        let mut catalog = EventCatalog::with_actors(["a", "b", "c", "d"]);
        let (events, _) = catalog.ingest(raw.clone());
        let (graph, _) = aggregate_window(&window_of(&events), 4);
        assert!(graph.is_symmetric());
        assert!(graph.has_zero_diagonal());

        let mut reversed_catalog = EventCatalog::with_actors(["a", "b", "c", "d"]);
        let (mut reversed, _) = reversed_catalog.ingest(raw);
        reversed.reverse();
        let (reversed_graph, _) = aggregate_window(&window_of(&reversed), 4);
        assert_eq!(graph, reversed_graph);
    }

    #[test]
    fn test_median_degree_ratio() {
        let mut catalog = EventCatalog::with_actors(["a", "b", "c"]);
        let (events, _) = catalog.ingest(vec![
            commit("a", &["f"], 1),
            commit("b", &["f"], 1),
            commit("c", &["g"], 1),
        ]);
        let (graph, activity) = aggregate_window(&window_of(&events), 3);
        // degrees 1, 1, 0 -> median 1 over 3 active actors
        assert_eq!(graph.median_degree_ratio(&activity), Some(0.333));
    }

    #[test]
    fn test_record_serialization_shape() {
        let mut catalog = EventCatalog::new();
        let (events, _) = catalog.ingest(vec![commit("a", &["f"], 1)]);
        let record = WindowRecord::from_window(&window_of(&events), 1);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["first_day"], "2020-05-01");
        assert_eq!(json["interaction"], serde_json::json!([[0]]));
        assert_eq!(json["author_activities"], serde_json::json!([1]));
    }
}
