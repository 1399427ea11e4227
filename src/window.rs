//! Sample points and before/after windows around an event anchor

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Minimum observations per side before any test may run
pub const MIN_TEST_SAMPLE: usize = 2;

/// Sample size below which normal approximations get a low-confidence warning
pub const MIN_RELIABLE_SAMPLE: usize = 20;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Atomic observation of one field for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub entity_id: String,
    pub field_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Value/timestamp pair as returned by a data provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimedValue {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Set of entities an analysis covers; empty means every entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityScope {
    pub entity_ids: Vec<String>,
}

impl EntityScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn entities<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entity_ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        entity_ids.sort();
        entity_ids.dedup();
        Self { entity_ids }
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entity_ids.is_empty() || self.entity_ids.iter().any(|e| e == entity_id)
    }
}

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Signed distance in (fractional) days from `anchor` to `ts`
pub fn days_from(anchor: DateTime<Utc>, ts: DateTime<Utc>) -> f64 {
    (ts - anchor).num_seconds() as f64 / SECONDS_PER_DAY
}

/// Extent of the before/after windows around an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub before_days: u32,
    pub after_days: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            before_days: 30,
            after_days: 30,
        }
    }
}

impl WindowSpec {
    pub fn new(before_days: u32, after_days: u32) -> Self {
        Self {
            before_days,
            after_days,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.before_days == 0 || self.after_days == 0 {
            return Err(format!(
                "window must extend on both sides of the anchor, got before={} after={}",
                self.before_days, self.after_days
            ));
        }
        Ok(())
    }

    /// Full analysis range covered by both windows
    pub fn range(&self, anchor: DateTime<Utc>) -> TimeRange {
        TimeRange {
            start: anchor - Duration::days(i64::from(self.before_days)),
            end: anchor + Duration::days(i64::from(self.after_days)),
        }
    }

    /// Partition a series into before/after windows
    ///
    /// Points exactly at the anchor belong to the after window; points
    /// outside the range are dropped.
    pub fn partition(&self, anchor: DateTime<Utc>, series: &[TimedValue]) -> WindowPair {
        let range = self.range(anchor);
        let mut before = Window::empty(range.start, anchor);
        let mut after = Window::empty(anchor, range.end);

        for point in series.iter().filter(|p| range.contains(p.timestamp)) {
            if point.timestamp < anchor {
                before.points.push(*point);
            } else {
                after.points.push(*point);
            }
        }
        before.sort();
        after.sort();

        WindowPair {
            anchor,
            before,
            after,
        }
    }
}

/// One side of the partition around the anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub points: Vec<TimedValue>,
}

impl Window {
    pub fn empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            points: Vec::new(),
        }
    }

    fn sort(&mut self) {
        self.points.sort_by_key(|p| p.timestamp);
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether enough observations exist to run a two-sample test
    pub fn is_testable(&self) -> bool {
        self.len() >= MIN_TEST_SAMPLE
    }
}

/// Before/after windows sharing the anchor as their boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPair {
    pub anchor: DateTime<Utc>,
    pub before: Window,
    pub after: Window,
}

impl WindowPair {
    /// All points (before then after) in chronological order
    pub fn all_points(&self) -> Vec<TimedValue> {
        let mut points = self.before.points.clone();
        points.extend_from_slice(&self.after.points);
        points
    }
}
