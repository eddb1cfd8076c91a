//! Aggregate sinks.
//!
//! A sink receives serialized aggregates under a key. Paths are fixed when a
//! sink is constructed; nothing here reads global state.

pub mod json_file;
pub mod memory;
pub mod stats;

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

// Re-export commonly used types
pub use json_file::JsonFileSink;
pub use memory::MemorySink;
pub use stats::{RunStats, RunStatsSnapshot};

/// Errors raised while persisting aggregates.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not write {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not serialize aggregate: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid sink key: {0:?}")]
    InvalidKey(String),
}

/// Destination for aggregated results.
pub trait AggregateSink {
    /// Persist `value` under `key`. A later call with the same key replaces
    /// the earlier value.
    fn accept<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), SinkError>;
}

/// Keys become file names, so they must be a single plain path component.
pub fn validate_key(key: &str) -> Result<(), SinkError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);
    if bad {
        return Err(SinkError::InvalidKey(key.to_string()));
    }
    Ok(())
}
