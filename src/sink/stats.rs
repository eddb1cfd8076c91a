//! Cumulative run statistics.
//!
//! Counters survive between invocations through a small JSON file in the
//! data directory, which the `status` command reads back.

use super::SinkError;
use crate::core::event::IngestReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// File name used inside the data directory.
pub const STATS_FILE: &str = "run_stats.json";

/// Counters across aggregation runs.
#[derive(Debug)]
pub struct RunStats {
    /// Runs completed
    runs: AtomicU64,
    /// Records accepted by ingest
    records_ingested: AtomicU64,
    /// Records skipped as malformed
    records_skipped: AtomicU64,
    /// Windows handed to a sink
    windows_emitted: AtomicU64,
    /// Metric values handed to a sink
    metrics_exported: AtomicU64,
    /// Durations recorded as zero
    fallback_durations: AtomicU64,
    started: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            runs: AtomicU64::new(0),
            records_ingested: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            windows_emitted: AtomicU64::new(0),
            metrics_exported: AtomicU64::new(0),
            fallback_durations: AtomicU64::new(0),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Stats backed by `path`, seeded from it when it exists.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "could not load previous run statistics");
        }

        stats
    }

    pub fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest(&self, report: &IngestReport) {
        self.records_ingested
            .fetch_add(report.accepted, Ordering::Relaxed);
        self.records_skipped
            .fetch_add(report.skipped(), Ordering::Relaxed);
    }

    pub fn record_windows(&self, count: u64) {
        self.windows_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_metrics_exported(&self, count: u64) {
        self.metrics_exported.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_fallback_durations(&self, count: u64) {
        self.fallback_durations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            windows_emitted: self.windows_emitted.load(Ordering::Relaxed),
            metrics_exported: self.metrics_exported.load(Ordering::Relaxed),
            fallback_durations: self.fallback_durations.load(Ordering::Relaxed),
            last_updated: Utc::now(),
        }
    }

    /// Human-readable summary for the `status` command.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Run Statistics:\n\
             - Runs completed: {}\n\
             - Records ingested: {}\n\
             - Records skipped (malformed): {}\n\
             - Windows emitted: {}\n\
             - Metric values exported: {}\n\
             - Close times recorded as zero: {}\n\
             - Tracking since: {}",
            s.runs,
            s.records_ingested,
            s.records_skipped,
            s.windows_emitted,
            s.metrics_exported,
            s.fallback_durations,
            self.started.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }

    /// Write the counters to the backing file, if any.
    pub fn save(&self) -> Result<(), SinkError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let persisted = PersistedStats {
            counters: self.snapshot(),
            started: self.started,
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(path, json).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })
    }

    fn load(&mut self) -> Result<(), SinkError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        let persisted: PersistedStats = serde_json::from_str(&content)?;
        let c = persisted.counters;

        self.runs.store(c.runs, Ordering::Relaxed);
        self.records_ingested
            .store(c.records_ingested, Ordering::Relaxed);
        self.records_skipped
            .store(c.records_skipped, Ordering::Relaxed);
        self.windows_emitted
            .store(c.windows_emitted, Ordering::Relaxed);
        self.metrics_exported
            .store(c.metrics_exported, Ordering::Relaxed);
        self.fallback_durations
            .store(c.fallback_durations, Ordering::Relaxed);
        self.started = persisted.started;
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.runs,
            &self.records_ingested,
            &self.records_skipped,
            &self.windows_emitted,
            &self.metrics_exported,
            &self.fallback_durations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatsSnapshot {
    pub runs: u64,
    pub records_ingested: u64,
    pub records_skipped: u64,
    pub windows_emitted: u64,
    pub metrics_exported: u64,
    pub fallback_durations: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    counters: RunStatsSnapshot,
    started: DateTime<Utc>,
}
