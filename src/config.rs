//! Configuration for repo-pulse.

use crate::core::bucketing::{ReferenceZone, UnknownTimeZone};
use crate::core::metrics::MergePolicy;
use crate::core::windowing::{StrideConvention, WindowBoundary};
use crate::source::{SubjectScope, DEFAULT_EVENT_TYPES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Days per window
    pub window_size: u32,

    /// Days between consecutive window starts, read per `stride_convention`
    pub stride: u32,

    pub stride_convention: StrideConvention,

    /// Whether the latest day may start a window
    pub boundary: WindowBoundary,

    /// Skip windows without events
    pub ignore_empty_windows: bool,

    /// Zone used to derive calendar days (`UTC`, `local`, or an IANA name)
    #[serde(with = "zone_serde")]
    pub time_zone: ReferenceZone,

    /// Drop events older than this many months before the reference instant
    pub time_budget_months: Option<u32>,

    /// How partial metric aggregates are reduced
    pub merge_policy: MergePolicy,

    /// Keep merge commits from commit logs
    pub include_merge_commits: bool,

    /// GH Archive event types to keep
    pub event_types: EventTypes,

    /// What GH Archive events are about when building graphs
    pub subject_scope: SubjectScope,

    /// Repositories metrics are computed for; empty means all
    pub repositories: Vec<String>,

    /// Only compute metrics for the K most active repositories
    pub top_k: Option<usize>,

    /// Directory aggregates are written to
    pub export_path: PathBuf,

    /// Directory for run statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repo-pulse");

        Self {
            window_size: 1,
            stride: 1,
            stride_convention: StrideConvention::default(),
            boundary: WindowBoundary::default(),
            ignore_empty_windows: true,
            time_zone: ReferenceZone::Utc,
            time_budget_months: None,
            merge_policy: MergePolicy::default(),
            include_merge_commits: false,
            event_types: EventTypes::default(),
            subject_scope: SubjectScope::default(),
            repositories: Vec::new(),
            top_k: None,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repo-pulse")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.export_path, &self.data_path] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Reject settings the window builder cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".into()));
        }
        if self.stride == 0 {
            return Err(ConfigError::Invalid("stride must be at least 1".into()));
        }
        if !self.event_types.any_enabled() {
            return Err(ConfigError::Invalid("event_types must not be empty".into()));
        }
        if self.top_k == Some(0) {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        Ok(())
    }

    /// Update one setting from its textual form, as given to `config set`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |e: &dyn std::fmt::Display| ConfigError::Invalid(format!("{key}: {e}"));

        match key {
            "window_size" => self.window_size = value.parse().map_err(|e| invalid(&e))?,
            "stride" => self.stride = value.parse().map_err(|e| invalid(&e))?,
            "stride_convention" => {
                self.stride_convention = value.parse().map_err(|e| invalid(&e))?
            }
            "boundary" => self.boundary = value.parse().map_err(|e| invalid(&e))?,
            "ignore_empty_windows" => {
                self.ignore_empty_windows = value.parse().map_err(|e| invalid(&e))?
            }
            "time_zone" => self.time_zone = value.parse()?,
            "time_budget_months" => {
                self.time_budget_months = match value.trim() {
                    "" | "none" => None,
                    months => Some(months.parse().map_err(|e| invalid(&e))?),
                }
            }
            "merge_policy" => self.merge_policy = value.parse().map_err(|e| invalid(&e))?,
            "include_merge_commits" => {
                self.include_merge_commits = value.parse().map_err(|e| invalid(&e))?
            }
            "event_types" => self.event_types = EventTypes::from_csv(value),
            "subject_scope" => self.subject_scope = value.parse().map_err(|e| invalid(&e))?,
            "repositories" => {
                self.repositories = value
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "top_k" => {
                self.top_k = match value.trim() {
                    "" | "none" => None,
                    k => Some(k.parse().map_err(|e| invalid(&e))?),
                }
            }
            "export_path" => self.export_path = PathBuf::from(value),
            "data_path" => self.data_path = PathBuf::from(value),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        self.validate()
    }
}

/// GH Archive event types to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTypes(pub Vec<String>);

impl Default for EventTypes {
    fn default() -> Self {
        Self(DEFAULT_EVENT_TYPES.iter().map(|t| t.to_string()).collect())
    }
}

impl EventTypes {
    /// Parse a comma-separated list. `all` keeps the defaults.
    pub fn from_csv(s: &str) -> Self {
        let types: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        if types.iter().any(|t| t.eq_ignore_ascii_case("all")) {
            return Self::default();
        }
        Self(types)
    }

    /// Check if at least one type is enabled.
    pub fn any_enabled(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    TimeZone(#[from] UnknownTimeZone),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Serde support for ReferenceZone.
mod zone_serde {
    use crate::core::bucketing::ReferenceZone;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(zone: &ReferenceZone, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        zone.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ReferenceZone, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
