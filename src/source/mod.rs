//! Source connectors.
//!
//! Connectors read repository activity from local files and hand it to the
//! core as [`RawEvent`]s. They are the only place that touches the
//! filesystem on the way in.

pub mod commit_log;
pub mod gh_archive;
pub mod types;

use std::path::PathBuf;
use thiserror::Error;

// Re-export commonly used types
pub use commit_log::{AuthorEntry, CommitEntry, CommitLog, FileEntry, COMMIT_KIND};
pub use gh_archive::{
    archive_url, parse_hour_key, ArchiveFiles, ArchiveParser, ArchiveRange, ArchiveStats,
    LineOutcome, SubjectScope, UnknownSubjectScope, DEFAULT_EVENT_TYPES,
};
pub use types::{RawEvent, RawTimestamp};

/// Errors raised while loading a connector's input.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
