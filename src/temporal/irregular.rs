// Irregular sampling: daily coverage and bounded gap interpolation
//
// Observations are bucketed into whole days relative to the anchor (daily
// mean). Interior gaps of at most `max_gap_days` are filled by linear
// interpolation, each filled day carrying confidence exp(-rate · gap_len).
// Longer gaps are left empty and reported. Days before the first or after
// the last observation are never extrapolated.

use crate::window::{days_from, TimedValue, WindowSpec};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrregularSpec {
    pub max_gap_days: u32,
    /// Confidence of an interpolated day is exp(-rate · gap length)
    pub confidence_decay_rate: f64,
}

impl Default for IrregularSpec {
    fn default() -> Self {
        Self {
            max_gap_days: 3,
            confidence_decay_rate: 0.5,
        }
    }
}

impl IrregularSpec {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.confidence_decay_rate.is_finite() && self.confidence_decay_rate >= 0.0) {
            return Err(format!(
                "confidence_decay_rate must be non-negative, got {}",
                self.confidence_decay_rate
            ));
        }
        Ok(())
    }

    pub fn confidence_for_gap(&self, gap_days: u32) -> f64 {
        (-self.confidence_decay_rate * f64::from(gap_days)).exp()
    }
}

/// One day of the regularized series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    /// Day offset from the anchor
    pub day: i64,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// 1.0 for observed days, < 1.0 for interpolated ones
    pub confidence: f64,
    pub interpolated: bool,
}

impl DailyPoint {
    pub fn as_timed(&self) -> TimedValue {
        TimedValue::new(self.timestamp, self.value)
    }
}

/// Interior run of missing days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start_day: i64,
    pub end_day: i64,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_days: u32,
    pub observed_days: u32,
    pub interpolated_days: u32,
    /// Observed days over total days, in [0, 1]
    pub coverage: f64,
    pub refused_gaps: Vec<Gap>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegularizedSeries {
    pub points: Vec<DailyPoint>,
    pub coverage: CoverageReport,
    pub warnings: Vec<String>,
}

/// Bucket into daily means and fill short interior gaps
pub fn regularize(
    series: &[TimedValue],
    anchor: DateTime<Utc>,
    range: &WindowSpec,
    spec: &IrregularSpec,
) -> RegularizedSeries {
    let first = -i64::from(range.before_days);
    let last = i64::from(range.after_days);

    let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for point in series {
        let day = days_from(anchor, point.timestamp).floor() as i64;
        if day < first || day >= last {
            continue;
        }
        let entry = buckets.entry(day).or_insert((0.0, 0));
        entry.0 += point.value;
        entry.1 += 1;
    }

    let observed: Vec<(i64, f64)> = buckets
        .into_iter()
        .map(|(day, (sum, count))| (day, sum / count as f64))
        .collect();

    let at_day = |day: i64| anchor + Duration::days(day);
    let mut points = Vec::with_capacity(observed.len());
    let mut refused_gaps = Vec::new();
    let mut warnings = Vec::new();
    let mut interpolated_days = 0u32;

    for (idx, &(day, value)) in observed.iter().enumerate() {
        points.push(DailyPoint {
            day,
            timestamp: at_day(day),
            value,
            confidence: 1.0,
            interpolated: false,
        });

        let Some(&(next_day, next_value)) = observed.get(idx + 1) else {
            continue;
        };
        let missing = (next_day - day - 1) as u32;
        if missing == 0 {
            continue;
        }
        if missing > spec.max_gap_days {
            tracing::warn!(
                start = day + 1,
                length = missing,
                "gap exceeds interpolation limit"
            );
            warnings.push(format!(
                "Gap of {} days starting at day {} exceeds the interpolation limit of {} days; left unfilled",
                missing,
                day + 1,
                spec.max_gap_days
            ));
            refused_gaps.push(Gap {
                start_day: day + 1,
                end_day: next_day - 1,
                length: missing,
            });
            continue;
        }

        let confidence = spec.confidence_for_gap(missing);
        let span = (next_day - day) as f64;
        for fill in (day + 1)..next_day {
            let t = (fill - day) as f64 / span;
            points.push(DailyPoint {
                day: fill,
                timestamp: at_day(fill),
                value: value + (next_value - value) * t,
                confidence,
                interpolated: true,
            });
            interpolated_days += 1;
        }
    }

    let total_days = (last - first).max(0) as u32;
    let observed_days = observed.len() as u32;
    let coverage = if total_days > 0 {
        f64::from(observed_days) / f64::from(total_days)
    } else {
        0.0
    };

    RegularizedSeries {
        points,
        coverage: CoverageReport {
            total_days,
            observed_days,
            interpolated_days,
            coverage,
            refused_gaps,
        },
        warnings,
    }
}
