// Sliding-window trend analysis and impact persistence
//
// Windows are laid over day offsets relative to the anchor, covering
// [-before_days, after_days). Each window reports its mean, variance and the
// least-squares slope (metric units per day) with R².

use crate::descriptive::{linear_regression, mean, variance};
use crate::window::{days_from, TimedValue, WindowSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum post-event windows with a non-zero deviation to fit persistence
const MIN_PERSISTENCE_WINDOWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingSpec {
    pub window_days: u32,
    pub step_days: u32,
}

impl Default for SlidingSpec {
    fn default() -> Self {
        Self {
            window_days: 7,
            step_days: 1,
        }
    }
}

impl SlidingSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_days == 0 || self.step_days == 0 {
            return Err(format!(
                "sliding window and step must be positive, got window={} step={}",
                self.window_days, self.step_days
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStat {
    /// Inclusive start offset in days from the anchor
    pub start_day: i64,
    /// Exclusive end offset
    pub end_day: i64,
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    pub slope: f64,
    pub r_squared: f64,
}

impl WindowStat {
    pub fn centre_day(&self) -> f64 {
        (self.start_day + self.end_day) as f64 / 2.0
    }

    pub fn is_post_event(&self) -> bool {
        self.start_day >= 0
    }
}

/// Post-event effect decay fitted on sliding-window means
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactPersistence {
    pub baseline_mean: f64,
    /// Fitted |mean - baseline| at the anchor
    pub initial_deviation: f64,
    /// Per-day decay rate of the deviation (positive when fading)
    pub decay_rate: f64,
    pub half_life_days: Option<f64>,
    pub r_squared: f64,
    /// True when the deviation is not fading
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidingAnalysis {
    pub spec: SlidingSpec,
    pub windows: Vec<WindowStat>,
    /// Slope fitted over every before-window point
    pub pre_event_slope: f64,
    pub post_event_slope: f64,
    pub slope_change: f64,
    pub persistence: Option<ImpactPersistence>,
}

fn stat_for(points: &[(f64, f64)], start_day: i64, end_day: i64) -> WindowStat {
    let (x, y): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
    let fit = linear_regression(&x, &y);
    WindowStat {
        start_day,
        end_day,
        count: y.len(),
        mean: mean(&y),
        variance: variance(&y),
        slope: fit.slope,
        r_squared: fit.r_squared,
    }
}

/// Sliding windows over the analysis range; empty windows are skipped
pub fn sliding_windows(
    points: &[TimedValue],
    anchor: DateTime<Utc>,
    range: &WindowSpec,
    spec: &SlidingSpec,
) -> Vec<WindowStat> {
    let offsets: Vec<(f64, f64)> = points
        .iter()
        .map(|p| (days_from(anchor, p.timestamp), p.value))
        .collect();

    let first = -i64::from(range.before_days);
    let last = i64::from(range.after_days);
    let width = i64::from(spec.window_days);
    let step = i64::from(spec.step_days).max(1);

    let mut windows = Vec::new();
    let mut start = first;
    while start + width <= last {
        let end = start + width;
        let members: Vec<(f64, f64)> = offsets
            .iter()
            .copied()
            .filter(|(d, _)| *d >= start as f64 && *d < end as f64)
            .collect();
        if !members.is_empty() {
            windows.push(stat_for(&members, start, end));
        }
        start += step;
    }
    windows
}

/// Fit ln|mean - baseline| against window centre over post-event windows
pub fn impact_persistence(windows: &[WindowStat], baseline_mean: f64) -> Option<ImpactPersistence> {
    let (x, y): (Vec<f64>, Vec<f64>) = windows
        .iter()
        .filter(|w| w.is_post_event())
        .filter_map(|w| {
            let deviation = (w.mean - baseline_mean).abs();
            (deviation > 1e-12).then(|| (w.centre_day(), deviation.ln()))
        })
        .unzip();
    if x.len() < MIN_PERSISTENCE_WINDOWS {
        return None;
    }

    let fit = linear_regression(&x, &y);
    let decay_rate = -fit.slope;
    let half_life_days = (decay_rate > 1e-9).then(|| std::f64::consts::LN_2 / decay_rate);
    Some(ImpactPersistence {
        baseline_mean,
        initial_deviation: fit.intercept.exp(),
        decay_rate,
        half_life_days,
        r_squared: fit.r_squared,
        persistent: half_life_days.is_none(),
    })
}

/// Full sliding analysis for a partitioned series
pub fn analyze_sliding(
    before: &[TimedValue],
    after: &[TimedValue],
    anchor: DateTime<Utc>,
    range: &WindowSpec,
    spec: &SlidingSpec,
) -> SlidingAnalysis {
    let mut all = before.to_vec();
    all.extend_from_slice(after);
    let windows = sliding_windows(&all, anchor, range, spec);

    let slope_of = |points: &[TimedValue]| {
        let (x, y): (Vec<f64>, Vec<f64>) = points
            .iter()
            .map(|p| (days_from(anchor, p.timestamp), p.value))
            .unzip();
        linear_regression(&x, &y).slope
    };
    let pre_event_slope = slope_of(before);
    let post_event_slope = slope_of(after);

    let baseline: Vec<f64> = before.iter().map(|p| p.value).collect();
    let persistence = if baseline.is_empty() {
        None
    } else {
        impact_persistence(&windows, mean(&baseline))
    };

    SlidingAnalysis {
        spec: *spec,
        windows,
        pre_event_slope,
        post_event_slope,
        slope_change: post_event_slope - pre_event_slope,
        persistence,
    }
}
