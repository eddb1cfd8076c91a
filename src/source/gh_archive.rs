//! GH Archive connector.
//!
//! GH Archive publishes one newline-delimited JSON file per hour, named
//! `YYYY-MM-DD-H`. This module reads already-downloaded (and decompressed)
//! hourly files, filters them by event type and maps each event onto a
//! [`RawEvent`]. Fetching the archives is left to the caller.
//!
//! Under [`SubjectScope::Issue`] issue, pull request and comment events are
//! about `owner/name#number` instead of the repository, and every comment
//! also yields an event for the issue's author, so commenters and the people
//! they answer share a subject.

use crate::source::types::RawEvent;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Split};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Event types read by default.
pub const DEFAULT_EVENT_TYPES: [&str; 3] = ["PushEvent", "IssuesEvent", "PullRequestEvent"];

/// Base URL of the hourly archives.
pub const ARCHIVE_BASE_URL: &str = "https://data.gharchive.org";

#[derive(Debug, Deserialize)]
struct ArchiveEvent {
    #[serde(rename = "type")]
    event_type: String,
    actor: Option<ArchiveActor>,
    repo: Option<ArchiveRepo>,
    created_at: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ArchiveActor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ArchiveRepo {
    name: String,
}

/// What an archive event's subject is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectScope {
    /// `owner/name`
    #[default]
    Repository,
    /// `owner/name#number` for issues and pull requests, the repository
    /// otherwise
    Issue,
}

impl fmt::Display for SubjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubjectScope::Repository => "repository",
            SubjectScope::Issue => "issue",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown subject scope: {0} (expected repository or issue)")]
pub struct UnknownSubjectScope(pub String);

impl FromStr for SubjectScope {
    type Err = UnknownSubjectScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repository" | "repo" => Ok(SubjectScope::Repository),
            "issue" => Ok(SubjectScope::Issue),
            _ => Err(UnknownSubjectScope(s.to_string())),
        }
    }
}

const COMMENT_KIND: &str = "IssueCommentEvent";

fn issue_number(payload: &Value) -> Option<u64> {
    payload
        .pointer("/issue/number")
        .or_else(|| payload.pointer("/pull_request/number"))
        .and_then(Value::as_u64)
}

/// Result of looking at a single archive line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Event(RawEvent),
    /// Valid JSON but the event type is not selected
    Filtered,
    /// Not a parseable archive event (blank lines included)
    Invalid,
}

/// Line counters for one read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub events: u64,
    pub filtered: u64,
    pub invalid_lines: u64,
}

/// Parses archive lines into raw events.
#[derive(Debug, Clone)]
pub struct ArchiveParser {
    event_types: Option<BTreeSet<String>>,
    scope: SubjectScope,
}

impl Default for ArchiveParser {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()))
    }
}

impl ArchiveParser {
    /// Create a parser accepting only the given event types.
    pub fn new(event_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            event_types: Some(event_types.into_iter().collect()),
            scope: SubjectScope::default(),
        }
    }

    /// Create a parser accepting every event type.
    pub fn accept_all() -> Self {
        Self {
            event_types: None,
            scope: SubjectScope::default(),
        }
    }

    pub fn with_scope(mut self, scope: SubjectScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scope(&self) -> SubjectScope {
        self.scope
    }

    fn subject(&self, repo: String, payload: &Value) -> String {
        match (self.scope, issue_number(payload)) {
            (SubjectScope::Issue, Some(number)) => format!("{repo}#{number}"),
            _ => repo,
        }
    }

    /// The issue author's side of a comment, under issue scope.
    ///
    /// Returns `None` for other events, for comments without a known issue
    /// author, and for authors commenting on their own issue.
    pub fn issue_author_event(&self, event: &RawEvent) -> Option<RawEvent> {
        if self.scope != SubjectScope::Issue || event.kind != COMMENT_KIND {
            return None;
        }
        let author = event.payload.pointer("/issue/user/login")?.as_str()?;
        if event.actor.as_deref() == Some(author) {
            return None;
        }
        Some(RawEvent {
            actor: Some(author.to_string()),
            ..event.clone()
        })
    }

    /// Parse a single line.
    pub fn parse_line(&self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Invalid;
        }

        let event: ArchiveEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(_) => return LineOutcome::Invalid,
        };

        if let Some(ref types) = self.event_types {
            if !types.contains(&event.event_type) {
                return LineOutcome::Filtered;
            }
        }

        let timestamp = match event.created_at {
            Some(created_at) => created_at,
            None => return LineOutcome::Invalid,
        };

        let subjects = match event.repo {
            Some(repo) => vec![self.subject(repo.name, &event.payload)],
            None => Vec::new(),
        };

        LineOutcome::Event(RawEvent {
            actor: event.actor.map(|a| a.login),
            unknown_actor_id: None,
            subjects,
            timestamp: timestamp.into(),
            kind: event.event_type,
            payload: event.payload,
        })
    }

    /// Parse a whole archive held in memory.
    pub fn parse_str(&self, content: &str) -> (Vec<RawEvent>, ArchiveStats) {
        let mut stats = ArchiveStats::default();
        let mut events = Vec::new();
        for line in content.lines() {
            match self.parse_line(line) {
                LineOutcome::Event(event) => {
                    stats.events += 1;
                    let author = self.issue_author_event(&event);
                    events.push(event);
                    events.extend(author);
                }
                LineOutcome::Filtered => stats.filtered += 1,
                LineOutcome::Invalid => stats.invalid_lines += 1,
            }
        }
        (events, stats)
    }
}

/// Streams events out of a list of hourly archive files.
///
/// Files that cannot be opened, and read errors part-way through a file, end
/// that file's contribution with a warning; the stream moves on to the next
/// file. Lines that are not UTF-8 count as invalid and do not end the file.
pub struct ArchiveFiles {
    parser: ArchiveParser,
    pending: VecDeque<PathBuf>,
    current: Option<(PathBuf, Split<BufReader<File>>)>,
    backlog: VecDeque<RawEvent>,
    stats: ArchiveStats,
}

impl ArchiveFiles {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>, parser: ArchiveParser) -> Self {
        Self {
            parser,
            pending: paths.into_iter().collect(),
            current: None,
            backlog: VecDeque::new(),
            stats: ArchiveStats::default(),
        }
    }

    /// Counters for everything read so far.
    pub fn stats(&self) -> ArchiveStats {
        self.stats
    }

    fn open_next(&mut self) -> bool {
        while let Some(path) = self.pending.pop_front() {
            match File::open(&path) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "reading archive");
                    self.current = Some((path, BufReader::new(file).split(b'\n')));
                    return true;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not open archive");
                }
            }
        }
        false
    }
}

impl Iterator for ArchiveFiles {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            if self.current.is_none() && !self.open_next() {
                return None;
            }

            let (path, lines) = self.current.as_mut()?;
            match lines.next() {
                Some(Ok(bytes)) => match String::from_utf8(bytes) {
                    Ok(line) => match self.parser.parse_line(&line) {
                        LineOutcome::Event(event) => {
                            self.stats.events += 1;
                            self.backlog.extend(self.parser.issue_author_event(&event));
                            return Some(event);
                        }
                        LineOutcome::Filtered => self.stats.filtered += 1,
                        LineOutcome::Invalid => self.stats.invalid_lines += 1,
                    },
                    Err(_) => self.stats.invalid_lines += 1,
                },
                Some(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "archive read failed");
                    self.current = None;
                }
                None => self.current = None,
            }
        }
    }
}

/// Inclusive calendar ranges selecting hourly archives.
///
/// Every combination of year, month, day and hour is produced; combinations
/// that are not real dates (Feb 30th, ...) are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveRange {
    pub years: (i32, i32),
    pub months: (u32, u32),
    pub days: (u32, u32),
    pub hours: (u32, u32),
}

impl ArchiveRange {
    /// Every hour of every day in the given years.
    pub fn years(first: i32, last: i32) -> Self {
        Self {
            years: (first, last),
            months: (1, 12),
            days: (1, 31),
            hours: (0, 23),
        }
    }

    /// Every hour of a single day.
    pub fn day(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            years: (date.year(), date.year()),
            months: (date.month(), date.month()),
            days: (date.day(), date.day()),
            hours: (0, 23),
        }
    }

    /// Hour keys (`YYYY-MM-DD-H`) covered by the range, in order.
    pub fn hour_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for year in self.years.0..=self.years.1 {
            for month in self.months.0..=self.months.1 {
                for day in self.days.0..=self.days.1 {
                    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
                        continue;
                    }
                    for hour in self.hours.0..=self.hours.1.min(23) {
                        keys.push(format!("{year:04}-{month:02}-{day:02}-{hour}"));
                    }
                }
            }
        }
        keys
    }

    /// Download URLs for the range.
    pub fn urls(&self) -> Vec<String> {
        self.hour_keys().iter().map(|k| archive_url(k)).collect()
    }
}

/// Download URL of an hourly archive.
pub fn archive_url(hour_key: &str) -> String {
    format!("{ARCHIVE_BASE_URL}/{hour_key}.json.gz")
}

/// Parse an hour key (or a file stem like `2020-03-12-16`) back into the
/// hour it names.
pub fn parse_hour_key(key: &str) -> Option<NaiveDateTime> {
    let (date, hour) = key.rsplit_once('-')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let hour: u32 = hour.parse().ok()?;
    date.and_hms_opt(hour, 0, 0)
}
