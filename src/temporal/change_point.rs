// Change-point detection over sliding-window statistics
//
// `WindowTripleDetector` keeps non-overlapping windows and compares each
// consecutive triple (a, b, c), standardizing by the pooled SD of a and c:
// - trend:    |c - a| exceeds the level threshold and the in-window slopes of
//             a, b and c all carry the sign of the shift, each moving at
//             least half a threshold across its window
// - level:    |c - a| exceeds the level threshold otherwise
// - variance: the variance ratio between a and c exceeds its threshold
// Consecutive hits of the same kind closer than one window are merged,
// keeping the strongest.

use super::sliding::WindowStat;
use serde::{Deserialize, Serialize};

/// SD floor used when both outer windows are constant
const MIN_POOLED_SD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Trend,
    Level,
    Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangePoint {
    /// Start of the middle window, in days from the anchor
    pub day: i64,
    pub kind: ChangeKind,
    /// Standardized size: pooled SDs for trend/level, variance ratio otherwise
    pub magnitude: f64,
    pub mean_before: f64,
    pub mean_after: f64,
}

pub trait ChangePointDetector {
    fn detect(&self, windows: &[WindowStat]) -> Vec<ChangePoint>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowTripleDetector {
    /// Mean shift, in pooled standard deviations, flagged as a level change
    pub level_threshold: f64,
    /// Larger-over-smaller variance ratio flagged as a variance change
    pub variance_ratio_threshold: f64,
}

impl Default for WindowTripleDetector {
    fn default() -> Self {
        Self {
            level_threshold: 1.0,
            variance_ratio_threshold: 3.0,
        }
    }
}

impl WindowTripleDetector {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.level_threshold > 0.0) {
            return Err("level_threshold must be positive".to_string());
        }
        if !(self.variance_ratio_threshold > 1.0) {
            return Err("variance_ratio_threshold must exceed 1".to_string());
        }
        Ok(())
    }

    fn classify(&self, a: &WindowStat, b: &WindowStat, c: &WindowStat) -> Option<ChangePoint> {
        let sd = ((a.variance + c.variance) / 2.0).sqrt().max(MIN_POOLED_SD);
        let total = (c.mean - a.mean) / sd;

        let point = |kind, magnitude: f64| ChangePoint {
            day: b.start_day,
            kind,
            magnitude,
            mean_before: a.mean,
            mean_after: c.mean,
        };

        if total.abs() > self.level_threshold {
            let half = self.level_threshold / 2.0;
            let steady = [a, b, c].iter().all(|w| {
                let drift = w.slope * (w.end_day - w.start_day) as f64 / sd;
                drift.signum() == total.signum() && drift.abs() >= half
            });
            let kind = if steady {
                ChangeKind::Trend
            } else {
                ChangeKind::Level
            };
            return Some(point(kind, total.abs()));
        }

        let (hi, lo) = if a.variance >= c.variance {
            (a.variance, c.variance)
        } else {
            (c.variance, a.variance)
        };
        if hi > 0.0 {
            let ratio = if lo > 0.0 { hi / lo } else { f64::MAX };
            if ratio > self.variance_ratio_threshold {
                return Some(point(ChangeKind::Variance, ratio.min(1e12)));
            }
        }
        None
    }
}

/// Keep windows that do not overlap the previously kept one
fn non_overlapping(windows: &[WindowStat]) -> Vec<WindowStat> {
    let mut kept: Vec<WindowStat> = Vec::new();
    for w in windows {
        match kept.last() {
            Some(last) if w.start_day < last.end_day => {}
            _ => kept.push(*w),
        }
    }
    kept
}

impl ChangePointDetector for WindowTripleDetector {
    fn detect(&self, windows: &[WindowStat]) -> Vec<ChangePoint> {
        let blocks = non_overlapping(windows);
        let mut found: Vec<ChangePoint> = Vec::new();

        for triple in blocks.windows(3) {
            let Some(hit) = self.classify(&triple[0], &triple[1], &triple[2]) else {
                continue;
            };
            let width = triple[1].end_day - triple[1].start_day;
            match found.last_mut() {
                Some(prev) if prev.kind == hit.kind && hit.day - prev.day <= width => {
                    if hit.magnitude > prev.magnitude {
                        *prev = hit;
                    }
                }
                _ => found.push(hit),
            }
        }
        found
    }
}
