//! Mapping of events onto metric updates.
//!
//! | kind             | condition          | updates                                   |
//! |------------------|--------------------|-------------------------------------------|
//! | PullRequestEvent | opened             | PullRequestOpenRate                       |
//! | PullRequestEvent | closed             | PullRequestCloseRate, Merge or Rejection  |
//! | IssuesEvent      | opened / reopened  | IssueOpenRate + label rates               |
//! | IssuesEvent      | closed             | IssueResolutionRate, AvgIssueCloseTime    |
//! | PushEvent        |                    | CommitRate += distinct_size               |
//!
//! Anything else produces no update.

use crate::core::event::EventKind;
use crate::core::metrics::MetricName;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// One change to apply to a metrics aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    /// Counter += 1
    Increment(MetricName),
    /// Counter += n
    Add(MetricName, u64),
    /// Running average observation. `None` when the duration is unknown.
    Duration(MetricName, Option<Duration>),
}

/// Updates implied by one event.
pub fn classify(kind: &EventKind, payload: &Value) -> Vec<MetricUpdate> {
    match kind {
        EventKind::PullRequest => pull_request_updates(payload),
        EventKind::Issues => issue_updates(payload),
        EventKind::Push => push_updates(payload),
        _ => Vec::new(),
    }
}

fn action(payload: &Value) -> Option<&str> {
    payload.get("action").and_then(Value::as_str)
}

fn pull_request_updates(payload: &Value) -> Vec<MetricUpdate> {
    use MetricUpdate::Increment;

    match action(payload) {
        Some("opened") => vec![Increment(MetricName::PullRequestOpenRate)],
        Some("closed") => {
            let merged = payload
                .pointer("/pull_request/merged")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let outcome = if merged {
                MetricName::PullRequestMergeRate
            } else {
                MetricName::PullRequestRejectionRate
            };
            vec![Increment(MetricName::PullRequestCloseRate), Increment(outcome)]
        }
        _ => Vec::new(),
    }
}

fn labels(payload: &Value) -> Vec<&str> {
    payload
        .pointer("/issue/labels")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|l| l.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn issue_time(payload: &Value, field: &str) -> Option<DateTime<Utc>> {
    payload
        .get("issue")?
        .get(field)?
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Time an issue stayed open. Unknown unless both `created_at` and
/// `closed_at` are present.
fn close_duration(payload: &Value) -> Option<Duration> {
    let created = issue_time(payload, "created_at")?;
    let closed = issue_time(payload, "closed_at")?;
    Some(closed - created)
}

fn issue_updates(payload: &Value) -> Vec<MetricUpdate> {
    use MetricUpdate::Increment;

    let labels = labels(payload);
    let has = |name: &str| labels.iter().any(|l| *l == name);
    let mut updates = Vec::new();

    match action(payload) {
        Some("opened") | Some("reopened") => {
            updates.push(Increment(MetricName::IssueOpenRate));
            if has("bug") {
                updates.push(Increment(MetricName::BugOpenRate));
            }
            if has("critical") {
                updates.push(Increment(MetricName::CriticalBugOpenRate));
            }
            if has("enhancement") {
                updates.push(Increment(MetricName::EnhancementRequestRate));
            }
        }
        Some("closed") => {
            updates.push(Increment(MetricName::IssueResolutionRate));
            updates.push(MetricUpdate::Duration(
                MetricName::AvgIssueCloseTime,
                close_duration(payload),
            ));
            if has("bug") {
                updates.push(Increment(MetricName::BugCloseRate));
            }
            if has("critical") {
                updates.push(Increment(MetricName::CriticalBugCloseRate));
            }
        }
        _ => {}
    }

    updates
}

fn push_updates(payload: &Value) -> Vec<MetricUpdate> {
    let commits = payload
        .get("distinct_size")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    vec![MetricUpdate::Add(MetricName::CommitRate, commits)]
}
