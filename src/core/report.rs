//! Export envelope wrapped around every batch handed to a sink.
//!
//! The envelope records who produced the batch, when, and the canonical
//! actor list the matrix indices of window records refer to.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Envelope format version.
pub const EXPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "repo-pulse";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
}

/// A batch of records plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEnvelope<R> {
    pub export_version: String,
    pub producer: Producer,
    /// Unique id of the run that produced the batch (UUID v4)
    pub run_id: String,
    /// When the batch was assembled (RFC3339)
    pub computed_at_utc: String,
    /// Actor identities in canonical index order
    pub actors: Vec<String>,
    pub records: Vec<R>,
    /// Run parameters and tallies
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

/// Stamps batches of one run with the same run id.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    run_id: Uuid,
    meta: BTreeMap<String, serde_json::Value>,
}

impl ReportBuilder {
    /// Create a builder with a fresh run id.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            meta: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Attach a metadata entry to every envelope built from now on.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn build<R>(&self, actors: Vec<String>, records: Vec<R>) -> ExportEnvelope<R> {
        ExportEnvelope {
            export_version: EXPORT_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            run_id: self.run_id.to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
            actors,
            records,
            meta: self.meta.clone(),
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
