//! Commit log connector.
//!
//! Reads the three JSON files the commit gatherer writes per repository
//! (`authors.json`, `files.json`, `commits.json`) and turns every commit into
//! a [`RawEvent`] whose subjects are the touched file paths.

use crate::source::types::RawEvent;
use crate::source::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Event kind string used for commits.
pub const COMMIT_KIND: &str = "commit";

/// An author entry from `authors.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorEntry {
    pub id: usize,
    pub name: String,
    pub email: String,
}

impl AuthorEntry {
    /// Identity string used to register the author as an actor.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.email)
    }
}

/// A file entry from `files.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: usize,
    pub file_path: String,
}

/// A commit summary from `commits.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEntry {
    /// Commit hash
    pub id: String,
    pub author_id: usize,
    /// Author time as unix seconds
    pub timestamp: f64,
    /// File ids touched by the commit
    #[serde(default)]
    pub files: Vec<usize>,
    /// Committed later than authored (amended, rebased, ...)
    #[serde(default)]
    pub post_commit_change: bool,
    #[serde(default)]
    pub is_merge_commit: bool,
}

/// A repository's commit log.
#[derive(Debug, Clone, Default)]
pub struct CommitLog {
    authors: Vec<AuthorEntry>,
    files: Vec<FileEntry>,
    commits: Vec<CommitEntry>,
}

impl CommitLog {
    /// Build a log from already-parsed parts.
    pub fn from_parts(
        mut authors: Vec<AuthorEntry>,
        files: Vec<FileEntry>,
        commits: Vec<CommitEntry>,
    ) -> Self {
        authors.sort_by_key(|a| a.id);
        Self {
            authors,
            files,
            commits,
        }
    }

    /// Load a log from a directory holding the three JSON files.
    pub fn load(dir: &Path) -> Result<Self, SourceError> {
        let authors: Vec<AuthorEntry> = read_json(&dir.join("authors.json"))?;
        let files: Vec<FileEntry> = read_json(&dir.join("files.json"))?;
        let commits: Vec<CommitEntry> = read_json(&dir.join("commits.json"))?;

        tracing::info!(
            dir = %dir.display(),
            authors = authors.len(),
            files = files.len(),
            commits = commits.len(),
            "loaded commit log"
        );

        Ok(Self::from_parts(authors, files, commits))
    }

    pub fn authors(&self) -> &[AuthorEntry] {
        &self.authors
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Actor identities in author-id order.
    ///
    /// Registering these before ingesting keeps the actor index equal to the
    /// author ids in the files, provided the ids are dense from zero.
    pub fn actor_identities(&self) -> Vec<String> {
        let dense = self.authors.iter().enumerate().all(|(i, a)| a.id == i);
        if !dense {
            tracing::warn!("author ids are not dense; actor index will differ from author ids");
        }
        self.authors.iter().map(AuthorEntry::identity).collect()
    }

    /// Convert commits into raw events.
    ///
    /// Unknown file ids are dropped from the subject list. A commit whose
    /// author id is unknown carries that id in `unknown_actor_id` so the core
    /// reports it as an unknown actor instead of silently dropping it here.
    pub fn to_events(&self, include_merge_commits: bool) -> Vec<RawEvent> {
        let authors: HashMap<usize, String> = self
            .authors
            .iter()
            .map(|a| (a.id, a.identity()))
            .collect();
        let paths: HashMap<usize, &str> = self
            .files
            .iter()
            .map(|f| (f.id, f.file_path.as_str()))
            .collect();

        self.commits
            .iter()
            .filter(|c| include_merge_commits || !c.is_merge_commit)
            .map(|commit| {
                let subjects = commit
                    .files
                    .iter()
                    .filter_map(|id| match paths.get(id) {
                        Some(path) => Some(path.to_string()),
                        None => {
                            tracing::debug!(commit = %commit.id, file_id = id, "unknown file id");
                            None
                        }
                    })
                    .collect();

                let actor = authors.get(&commit.author_id).cloned();
                let unknown_actor_id = actor.is_none().then_some(commit.author_id);

                RawEvent {
                    actor,
                    unknown_actor_id,
                    subjects,
                    timestamp: commit.timestamp.into(),
                    kind: COMMIT_KIND.to_string(),
                    payload: serde_json::json!({
                        "id": commit.id,
                        "post_commit_change": commit.post_commit_change,
                        "is_merge_commit": commit.is_merge_commit,
                    }),
                }
            })
            .collect()
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> CommitLog {
        CommitLog::from_parts(
            vec![
                AuthorEntry {
                    id: 1,
                    name: "Bo".to_string(),
                    email: "bo@example.com".to_string(),
                },
                AuthorEntry {
                    id: 0,
                    name: "Al".to_string(),
                    email: "al@example.com".to_string(),
                },
            ],
            vec![
                FileEntry {
                    id: 0,
                    file_path: "src/lib.rs".to_string(),
                },
                FileEntry {
                    id: 1,
                    file_path: "README.md".to_string(),
                },
            ],
            vec![
                CommitEntry {
                    id: "abc".to_string(),
                    author_id: 0,
                    timestamp: 1_588_291_200.0,
                    files: vec![0, 1, 7],
                    post_commit_change: false,
                    is_merge_commit: false,
                },
                CommitEntry {
                    id: "def".to_string(),
                    author_id: 1,
                    timestamp: 1_588_377_600.0,
                    files: vec![],
                    post_commit_change: false,
                    is_merge_commit: true,
                },
                CommitEntry {
                    id: "ghi".to_string(),
                    author_id: 9,
                    timestamp: 1_588_377_600.0,
                    files: vec![1],
                    post_commit_change: true,
                    is_merge_commit: false,
                },
            ],
        )
    }

    #[test]
    fn test_actor_identities_follow_author_ids() {
        let log = sample_log();
        assert_eq!(
            log.actor_identities(),
            vec!["Al-al@example.com", "Bo-bo@example.com"]
        );
    }

    #[test]
    fn test_merge_commits_excluded_by_default() {
        let log = sample_log();
        assert_eq!(log.to_events(false).len(), 2);
        assert_eq!(log.to_events(true).len(), 3);
    }

    #[test]
    fn test_commit_mapping() {
        let events = sample_log().to_events(false);

        let first = &events[0];
        assert_eq!(first.actor.as_deref(), Some("Al-al@example.com"));
        assert_eq!(first.subjects, vec!["src/lib.rs", "README.md"]);
        assert_eq!(first.kind, COMMIT_KIND);
        assert_eq!(first.payload["id"], "abc");

        // Unknown author stays unresolved for the core to report
        assert!(events[1].actor.is_none());
        assert_eq!(events[1].unknown_actor_id, Some(9));
        assert_eq!(first.unknown_actor_id, None);
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = std::env::temp_dir().join("repo-pulse-missing-commit-log");
        let result = CommitLog::load(&dir);
        assert!(matches!(result, Err(SourceError::Io { .. })));
    }
}
