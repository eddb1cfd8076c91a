//! Sliding day windows over bucketed events.
//!
//! A window spans `window_size` calendar days starting at a cursor day. The
//! cursor starts on the earliest day, advances by the stride after each
//! window, and stops once it reaches the latest day.
//!
//! Two behaviours are kept from the historic graph generator on purpose:
//!
//! - Windows always span exactly `window_size` days, so the last one may run
//!   past the latest observed day and hold fewer days of data.
//! - The loop ends when the cursor *reaches* the latest day. A single-day
//!   input therefore yields no windows, and with `stride == window_size`
//!   events on the latest day can fall outside every window.
//!   [`WindowBoundary::Inclusive`] runs one more step for callers that need
//!   every active day covered.

use crate::core::bucketing::DayBuckets;
use crate::core::event::EventRecord;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How `stride` moves the window cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrideConvention {
    /// Advance by `stride` days
    #[default]
    Direct,
    /// Advance by `stride - 1` days, at least one (historic graph generator)
    SkipDay,
    /// Advance by `stride + window_size` days (historic non-overlap flag)
    AfterWindow,
}

/// When the cursor loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowBoundary {
    /// Run while `cursor < latest day`
    #[default]
    Exclusive,
    /// Run while `cursor <= latest day`
    Inclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("window size must be at least one day")]
    ZeroWindowSize,

    #[error("stride must be at least one day")]
    ZeroStride,

    #[error("unknown {what}: {value}")]
    UnknownOption { what: &'static str, value: String },
}

impl FromStr for StrideConvention {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "direct" => Ok(StrideConvention::Direct),
            "skip_day" => Ok(StrideConvention::SkipDay),
            "after_window" => Ok(StrideConvention::AfterWindow),
            _ => Err(WindowError::UnknownOption {
                what: "stride convention",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for WindowBoundary {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exclusive" => Ok(WindowBoundary::Exclusive),
            "inclusive" => Ok(WindowBoundary::Inclusive),
            _ => Err(WindowError::UnknownOption {
                what: "window boundary",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for StrideConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrideConvention::Direct => "direct",
            StrideConvention::SkipDay => "skip_day",
            StrideConvention::AfterWindow => "after_window",
        })
    }
}

/// A span of days and the events that fell into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<'a> {
    /// First day of the window
    pub first_day: NaiveDate,
    /// Last day of the window (inclusive)
    pub last_day: NaiveDate,
    /// Events of every bucketed day in the span, in day order
    pub events: Vec<&'a EventRecord>,
}

impl<'a> Window<'a> {
    /// Check if a day falls within this window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day && date <= self.last_day
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of days the window spans.
    pub fn span_days(&self) -> i64 {
        (self.last_day - self.first_day).num_days() + 1
    }
}

/// Builds windows over day buckets. Holds no iteration state, so the same
/// builder can be reused for any number of passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBuilder {
    window_size: u32,
    stride: u32,
    ignore_empty: bool,
    convention: StrideConvention,
    boundary: WindowBoundary,
}

impl WindowBuilder {
    /// Create a builder with the given window size and stride (in days).
    /// Empty windows are skipped by default.
    pub fn new(window_size: u32, stride: u32) -> Result<Self, WindowError> {
        if window_size == 0 {
            return Err(WindowError::ZeroWindowSize);
        }
        if stride == 0 {
            return Err(WindowError::ZeroStride);
        }
        Ok(Self {
            window_size,
            stride,
            ignore_empty: true,
            convention: StrideConvention::default(),
            boundary: WindowBoundary::default(),
        })
    }

    pub fn ignore_empty(mut self, ignore_empty: bool) -> Self {
        self.ignore_empty = ignore_empty;
        self
    }

    pub fn with_convention(mut self, convention: StrideConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn with_boundary(mut self, boundary: WindowBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Days the cursor moves after each window.
    pub fn advance_days(&self) -> u64 {
        let stride = u64::from(self.stride);
        match self.convention {
            StrideConvention::Direct => stride,
            StrideConvention::SkipDay => stride.saturating_sub(1).max(1),
            StrideConvention::AfterWindow => stride + u64::from(self.window_size),
        }
    }

    /// Windows over every observed day. Empty buckets give no windows.
    pub fn windows<'a>(&self, buckets: &'a DayBuckets) -> Windows<'a> {
        match (buckets.first_date(), buckets.last_date()) {
            (Some(first), Some(last)) => self.windows_between(buckets, first, last),
            _ => Windows {
                buckets,
                cursor: None,
                latest: NaiveDate::MIN,
                builder: *self,
            },
        }
    }

    /// Windows over an explicit day range, whether or not it holds events.
    pub fn windows_between<'a>(
        &self,
        buckets: &'a DayBuckets,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Windows<'a> {
        Windows {
            buckets,
            cursor: Some(first),
            latest: last,
            builder: *self,
        }
    }

    fn in_range(&self, cursor: NaiveDate, latest: NaiveDate) -> bool {
        match self.boundary {
            WindowBoundary::Exclusive => cursor < latest,
            WindowBoundary::Inclusive => cursor <= latest,
        }
    }
}

/// Lazy window sequence produced by [`WindowBuilder`].
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    buckets: &'a DayBuckets,
    cursor: Option<NaiveDate>,
    latest: NaiveDate,
    builder: WindowBuilder,
}

impl<'a> Iterator for Windows<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Window<'a>> {
        loop {
            let first_day = self.cursor?;
            if !self.builder.in_range(first_day, self.latest) {
                self.cursor = None;
                return None;
            }

            let span = Days::new(u64::from(self.builder.window_size) - 1);
            let last_day = first_day.checked_add_days(span).unwrap_or(NaiveDate::MAX);

            let events: Vec<&'a EventRecord> = self
                .buckets
                .range(first_day..=last_day)
                .flat_map(|bucket| bucket.events.iter())
                .collect();

            self.cursor = first_day.checked_add_days(Days::new(self.builder.advance_days()));

            if self.builder.ignore_empty && events.is_empty() {
                continue;
            }

            return Some(Window {
                first_day,
                last_day,
                events,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bucketing::DayBucketer;
    use crate::core::event::EventCatalog;
    use crate::source::types::RawEvent;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 5, d).unwrap()
    }

    fn buckets_on(days: &[u32]) -> DayBuckets {
        let mut catalog = EventCatalog::new();
        let (events, _) = catalog.ingest(days.iter().map(|d| {
            RawEvent::new(
                "dev",
                vec![],
                format!("2020-05-{d:02}T12:00:00Z"),
                "commit",
            )
        }));
        DayBucketer::default().bucket(events)
    }

    fn spans(windows: Windows<'_>) -> Vec<(u32, u32, usize)> {
        use chrono::Datelike;
        windows
            .map(|w| (w.first_day.day(), w.last_day.day(), w.event_count()))
            .collect()
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert_eq!(WindowBuilder::new(0, 1), Err(WindowError::ZeroWindowSize));
        assert_eq!(WindowBuilder::new(1, 0), Err(WindowError::ZeroStride));
    }

    #[test]
    fn test_window_contains() {
        let window = Window {
            first_day: date(3),
            last_day: date(5),
            events: Vec::new(),
        };
        assert!(window.contains(date(3)));
        assert!(window.contains(date(5)));
        assert!(!window.contains(date(6)));
        assert_eq!(window.span_days(), 3);
    }

    #[test]
    fn test_overlapping_windows() {
        let buckets = buckets_on(&[1, 2, 3, 4]);
        let builder = WindowBuilder::new(2, 1).unwrap();
        assert_eq!(
            spans(builder.windows(&buckets)),
            vec![(1, 2, 2), (2, 3, 2), (3, 4, 2)]
        );
    }

    #[test]
    fn test_last_window_may_run_past_latest_day() {
        let buckets = buckets_on(&[1, 2, 4]);
        let builder = WindowBuilder::new(3, 2).unwrap();
        // cursor 1 -> [1,3], cursor 3 -> [3,5], cursor 5 stops
        assert_eq!(spans(builder.windows(&buckets)), vec![(1, 3, 2), (3, 5, 1)]);
        for window in builder.windows(&buckets) {
            assert_eq!(window.span_days(), 3);
        }
    }

    #[test]
    fn test_single_day_yields_no_windows() {
        let buckets = buckets_on(&[7, 7]);
        let builder = WindowBuilder::new(1, 1).unwrap();
        assert_eq!(builder.windows(&buckets).count(), 0);

        let inclusive = builder.with_boundary(WindowBoundary::Inclusive);
        assert_eq!(spans(inclusive.windows(&buckets)), vec![(7, 7, 2)]);
    }

    #[test]
    fn test_ignore_empty_policy() {
        let buckets = buckets_on(&[1, 9]);
        let builder = WindowBuilder::new(2, 2).unwrap();

        assert_eq!(spans(builder.windows(&buckets)), vec![(1, 2, 1)]);

        let keep = builder.ignore_empty(false);
        assert_eq!(
            spans(keep.windows(&buckets)),
            vec![(1, 2, 1), (3, 4, 0), (5, 6, 0), (7, 8, 0)]
        );
    }

    #[test]
    fn test_stride_conventions() {
        let builder = WindowBuilder::new(2, 2).unwrap();
        assert_eq!(builder.advance_days(), 2);
        assert_eq!(
            builder.with_convention(StrideConvention::SkipDay).advance_days(),
            1
        );
        assert_eq!(
            builder
                .with_convention(StrideConvention::AfterWindow)
                .advance_days(),
            4
        );
        // stride 1 under SkipDay still moves forward
        let one = WindowBuilder::new(1, 1)
            .unwrap()
            .with_convention(StrideConvention::SkipDay);
        assert_eq!(one.advance_days(), 1);
    }

    #[test]
    fn test_convention_parsing() {
        assert_eq!(
            "skip-day".parse::<StrideConvention>().unwrap(),
            StrideConvention::SkipDay
        );
        assert_eq!(
            "after_window".parse::<StrideConvention>().unwrap(),
            StrideConvention::AfterWindow
        );
        assert_eq!(
            "Inclusive".parse::<WindowBoundary>().unwrap(),
            WindowBoundary::Inclusive
        );
        assert!("sideways".parse::<StrideConvention>().is_err());
    }

    #[test]
    fn test_windows_are_restartable() {
        let buckets = buckets_on(&[1, 2, 3, 5, 8]);
        let builder = WindowBuilder::new(3, 1).unwrap();
        let first: Vec<_> = spans(builder.windows(&buckets));
        let second: Vec<_> = spans(builder.windows(&buckets));
        assert_eq!(first, second);
    }

    #[test]
    fn test_windows_in_first_day_order() {
        let buckets = buckets_on(&[1, 4, 6, 11, 12]);
        let builder = WindowBuilder::new(3, 2).unwrap().ignore_empty(false);
        let firsts: Vec<NaiveDate> = builder.windows(&buckets).map(|w| w.first_day).collect();
        assert!(firsts.windows(2).all(|p| p[0] <= p[1]));
    }

    #[test]
    fn test_empty_buckets_yield_nothing() {
        let buckets = DayBuckets::default();
        let builder = WindowBuilder::new(2, 1).unwrap().ignore_empty(false);
        assert_eq!(builder.windows(&buckets).count(), 0);
    }

    #[test]
    fn test_empty_range_window_counts() {
        let buckets = DayBuckets::default();
        for (size, stride, last) in [(2u32, 2u32, 10u32), (3, 2, 9), (1, 3, 11), (4, 1, 2)] {
            let builder = WindowBuilder::new(size, stride).unwrap();
            assert_eq!(
                builder.windows_between(&buckets, date(1), date(last)).count(),
                0
            );

            let expected = ((last - 1) as f64 / stride as f64).ceil() as usize;
            let keep = builder.ignore_empty(false);
            assert_eq!(
                keep.windows_between(&buckets, date(1), date(last)).count(),
                expected,
                "size {size} stride {stride} last {last}"
            );
        }
    }

    #[test]
    fn test_tiling_covers_every_active_day_once() {
        let day_sets: [&[u32]; 4] = [&[1, 2, 3], &[1, 5, 6, 13], &[2, 3, 4, 5, 6, 7, 30], &[4, 9]];
        for days in day_sets {
            let buckets = buckets_on(days);
            for (size, ignore_empty) in (1..=4).flat_map(|s| [(s, true), (s, false)]) {
                let builder = WindowBuilder::new(size, size)
                    .unwrap()
                    .with_boundary(WindowBoundary::Inclusive)
                    .ignore_empty(ignore_empty);
                let windows: Vec<Window<'_>> = builder.windows(&buckets).collect();

                for pair in windows.windows(2) {
                    assert!(pair[0].last_day < pair[1].first_day);
                    if !ignore_empty {
                        // Kept empty windows tile the range without gaps
                        assert_eq!(pair[0].last_day.succ_opt(), Some(pair[1].first_day));
                    }
                }
                for day in buckets.dates() {
                    let holders = windows.iter().filter(|w| w.contains(day)).count();
                    assert_eq!(holders, 1, "day {day} size {size} ignore_empty {ignore_empty}");
                }
                assert_eq!(
                    windows.iter().map(Window::event_count).sum::<usize>(),
                    buckets.event_count()
                );
                if ignore_empty {
                    assert!(windows.iter().all(|w| !w.is_empty()));
                }
            }
        }
    }
}
