//! repo-pulse - windowed contributor interaction and repository activity
//! metrics.
//!
//! Timestamped repository activity (commit logs, GH Archive event streams)
//! is sorted, grouped by calendar day and folded either into sliding-window
//! interaction graphs between contributors or into incremental per-repository
//! daily metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         repo-pulse                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐            │
//! │  │   Source   │──▶│   Ingest   │──▶│ Sort/Bucket│            │
//! │  │ (commits,  │   │ (registry) │   │ (by day)   │            │
//! │  │  archive)  │   └────────────┘   └─────┬──────┘            │
//! │  └────────────┘                    ┌─────┴──────┐            │
//! │                                    ▼            ▼            │
//! │                            ┌────────────┐ ┌────────────┐     │
//! │                            │  Windows + │ │  Metrics   │     │
//! │                            │ Interaction│ │ (merge)    │     │
//! │                            └─────┬──────┘ └─────┬──────┘     │
//! │                                  ▼              ▼            │
//! │                            ┌───────────────────────────┐     │
//! │                            │   Sink (+ run statistics) │     │
//! │                            └───────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use repo_pulse::core::{EventCatalog, Pipeline, ReferenceZone, WindowBuilder};
//! use repo_pulse::source::RawEvent;
//!
//! let pipeline = Pipeline::new(WindowBuilder::new(2, 2).unwrap(), ReferenceZone::Utc);
//! let mut catalog = EventCatalog::new();
//! let run = pipeline.run_graph(
//!     &mut catalog,
//!     vec![
//!         RawEvent::new("A", vec!["f1".into()], "2020-05-01T10:00:00Z", "commit"),
//!         RawEvent::new("B", vec!["f1".into()], "2020-05-02T10:00:00Z", "commit"),
//!     ],
//!     chrono::Utc::now(),
//! );
//! assert_eq!(run.records[0].interaction, vec![vec![0, 1], vec![1, 0]]);
//! ```

pub mod config;
pub mod core;
pub mod sink;
pub mod source;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, EventTypes};
pub use core::{
    EventCatalog, EventRecord, ExportEnvelope, MetricsAggregator, Pipeline, ReportBuilder,
    WindowBuilder, WindowRecord, PRODUCER_NAME,
};
pub use sink::{AggregateSink, JsonFileSink, MemorySink, RunStats, SinkError};
pub use source::{ArchiveFiles, ArchiveParser, CommitLog, RawEvent, SourceError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_envelope() {
        let envelope = ReportBuilder::new().build::<u8>(Vec::new(), Vec::new());
        assert_eq!(envelope.producer.version, VERSION);
        assert_eq!(envelope.producer.name, PRODUCER_NAME);
    }
}
