use super::{validate_key, AggregateSink, SinkError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Writes each aggregate to `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    pretty: bool,
    written: Vec<PathBuf>,
}

impl JsonFileSink {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pretty: true,
            written: Vec::new(),
        }
    }

    /// Emit compact JSON instead of pretty-printed JSON.
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Files written so far, in write order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl AggregateSink for JsonFileSink {
    fn accept<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), SinkError> {
        validate_key(key)?;

        let content = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        std::fs::create_dir_all(&self.dir).map_err(|source| SinkError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(key);
        std::fs::write(&path, content).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), "wrote aggregate");
        self.written.push(path);
        Ok(())
    }
}
