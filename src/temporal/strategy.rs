// Composable preprocessing strategies: outlier filtering and clustering

use crate::descriptive::{mean, quantile, std_dev};
use crate::window::TimedValue;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Removes outlying observations before temporal analysis
pub trait OutlierFilter {
    /// Returns the kept points (order preserved) and the number removed
    fn filter(&self, points: &[TimedValue]) -> (Vec<TimedValue>, usize);
}

/// Tukey fences: keep values within [Q1 - k·IQR, Q3 + k·IQR]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrFilter {
    pub multiplier: f64,
}

impl Default for IqrFilter {
    fn default() -> Self {
        Self { multiplier: 1.5 }
    }
}

impl OutlierFilter for IqrFilter {
    fn filter(&self, points: &[TimedValue]) -> (Vec<TimedValue>, usize) {
        if points.len() < 4 {
            return (points.to_vec(), 0);
        }
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let q1 = quantile(&values, 0.25);
        let q3 = quantile(&values, 0.75);
        let iqr = q3 - q1;
        let (low, high) = (q1 - self.multiplier * iqr, q3 + self.multiplier * iqr);
        partition_kept(points, |v| v >= low && v <= high)
    }
}

/// Keep values within `threshold` standard deviations of the mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreFilter {
    pub threshold: f64,
}

impl Default for ZScoreFilter {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

impl OutlierFilter for ZScoreFilter {
    fn filter(&self, points: &[TimedValue]) -> (Vec<TimedValue>, usize) {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let sd = std_dev(&values);
        if sd <= 0.0 {
            return (points.to_vec(), 0);
        }
        let m = mean(&values);
        partition_kept(points, |v| ((v - m) / sd).abs() <= self.threshold)
    }
}

fn partition_kept<F: Fn(f64) -> bool>(points: &[TimedValue], keep: F) -> (Vec<TimedValue>, usize) {
    let kept: Vec<TimedValue> = points.iter().copied().filter(|p| keep(p.value)).collect();
    let removed = points.len() - kept.len();
    (kept, removed)
}

/// Configuration-level selection of an outlier filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OutlierFilterSpec {
    Iqr { multiplier: f64 },
    ZScore { threshold: f64 },
}

impl OutlierFilterSpec {
    pub fn build(&self) -> Box<dyn OutlierFilter + Send + Sync> {
        match *self {
            OutlierFilterSpec::Iqr { multiplier } => Box::new(IqrFilter { multiplier }),
            OutlierFilterSpec::ZScore { threshold } => Box::new(ZScoreFilter { threshold }),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let value = match self {
            OutlierFilterSpec::Iqr { multiplier } => multiplier,
            OutlierFilterSpec::ZScore { threshold } => threshold,
        };
        if !(value.is_finite() && *value > 0.0) {
            return Err(format!("outlier filter parameter must be positive, got {}", value));
        }
        Ok(())
    }
}

/// Episode of closely spaced observations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalCluster {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
    pub mean: f64,
}

/// Groups observations into temporal episodes
pub trait ClusteringStrategy {
    fn cluster(&self, points: &[TimedValue]) -> Vec<TemporalCluster>;
}

/// Starts a new cluster whenever consecutive observations are further apart
/// than `max_gap_hours`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapClustering {
    pub max_gap_hours: f64,
}

impl Default for GapClustering {
    fn default() -> Self {
        Self {
            max_gap_hours: 48.0,
        }
    }
}

impl ClusteringStrategy for GapClustering {
    fn cluster(&self, points: &[TimedValue]) -> Vec<TemporalCluster> {
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.timestamp);

        let max_gap = Duration::seconds((self.max_gap_hours * 3600.0).round() as i64);
        let mut clusters = Vec::new();
        let mut current: Vec<TimedValue> = Vec::new();

        let flush = |members: &mut Vec<TimedValue>, out: &mut Vec<TemporalCluster>| {
            if let (Some(first), Some(last)) = (members.first(), members.last()) {
                let values: Vec<f64> = members.iter().map(|p| p.value).collect();
                out.push(TemporalCluster {
                    start: first.timestamp,
                    end: last.timestamp,
                    count: members.len(),
                    mean: mean(&values),
                });
            }
            members.clear();
        };

        for point in sorted {
            if let Some(prev) = current.last() {
                if point.timestamp - prev.timestamp > max_gap {
                    flush(&mut current, &mut clusters);
                }
            }
            current.push(point);
        }
        flush(&mut current, &mut clusters);
        clusters
    }
}
