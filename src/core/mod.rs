//! Core aggregation engine.
//!
//! This module contains:
//! - The canonical event model and identity registries
//! - Chronological sorting, day bucketing and sliding windows
//! - Interaction graphs and incremental metrics
//! - Roll-ups, trend statistics and the export envelope

pub mod bucketing;
pub mod dispatch;
pub mod event;
pub mod interaction;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod rollup;
pub mod sorting;
pub mod trend;
pub mod windowing;

// Re-export commonly used types
pub use bucketing::{DayBucket, DayBucketer, DayBuckets, ReferenceZone};
pub use event::{ActorId, EventCatalog, EventKind, EventRecord, IngestReport, RecordError, SubjectId};
pub use interaction::{aggregate_window, ActivityVector, InteractionGraph, WindowRecord};
pub use metrics::{
    aggregate_partitions, MergePolicy, MetricKey, MetricName, MetricSnapshot, MetricsAggregator,
    RunningMetric,
};
pub use pipeline::{GraphRun, MetricsRun, Pipeline, RepositorySelection};
pub use report::{ExportEnvelope, ReportBuilder, EXPORT_VERSION, PRODUCER_NAME};
pub use rollup::{rank_subjects, Granularity, Rollup, RollupRow, RollupTable};
pub use sorting::sort_events;
pub use trend::{describe, summarize, MetricSummary};
pub use windowing::{StrideConvention, Window, WindowBoundary, WindowBuilder, WindowError};
