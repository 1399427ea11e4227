// Anomaly detection against the pre-event baseline
//
// Post-event observations are scored by z-score against the before window.
// Severity follows fixed bands: Low 3-4σ, Medium 4-5σ, High above 5σ.

use crate::descriptive::{mean, std_dev};
use crate::window::TimedValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Baseline observations required before anything is flagged
const MIN_BASELINE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalySeverity {
    /// 3σ - 4σ from the baseline mean
    Low,
    /// 4σ - 5σ
    Medium,
    /// above 5σ
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub z_score: f64,
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
    pub severity: AnomalySeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalySpec {
    pub threshold: f64,
}

impl Default for AnomalySpec {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

pub fn classify_severity(z_score: f64) -> AnomalySeverity {
    let z = z_score.abs();
    if z > 5.0 {
        AnomalySeverity::High
    } else if z > 4.0 {
        AnomalySeverity::Medium
    } else {
        AnomalySeverity::Low
    }
}

/// Z-score detector with a frozen baseline
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    baseline_mean: f64,
    baseline_std_dev: f64,
    baseline_len: usize,
    threshold: f64,
    detected: Vec<Anomaly>,
}

impl AnomalyDetector {
    pub fn from_baseline(baseline: &[f64], threshold: f64) -> Self {
        Self {
            baseline_mean: mean(baseline),
            baseline_std_dev: std_dev(baseline),
            baseline_len: baseline.len(),
            threshold,
            detected: Vec::new(),
        }
    }

    /// Enough baseline points for a meaningful z-score
    pub fn is_ready(&self) -> bool {
        self.baseline_len >= MIN_BASELINE
    }

    /// Score one observation; anomalies are also kept for the summary
    pub fn check(&mut self, point: &TimedValue) -> Option<Anomaly> {
        if !self.is_ready() || self.baseline_std_dev <= 0.0 {
            // A constant baseline makes every deviation infinite; not flagged
            return None;
        }
        let z_score = (point.value - self.baseline_mean) / self.baseline_std_dev;
        if z_score.abs() <= self.threshold {
            return None;
        }
        let anomaly = Anomaly {
            timestamp: point.timestamp,
            value: point.value,
            z_score,
            baseline_mean: self.baseline_mean,
            baseline_std_dev: self.baseline_std_dev,
            severity: classify_severity(z_score),
        };
        self.detected.push(anomaly);
        Some(anomaly)
    }

    pub fn scan(&mut self, points: &[TimedValue]) -> Vec<Anomaly> {
        points.iter().filter_map(|p| self.check(p)).collect()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.detected
    }

    pub fn to_report_string(&self) -> String {
        if self.detected.is_empty() {
            return String::new();
        }
        let count = |s: AnomalySeverity| self.detected.iter().filter(|a| a.severity == s).count();
        let mut out = format!("Anomalies detected: {}\n", self.detected.len());
        let bands = [
            (AnomalySeverity::High, "🔴 High (>5.0σ)"),
            (AnomalySeverity::Medium, "🟡 Medium (4-5σ)"),
            (AnomalySeverity::Low, "🟢 Low (3-4σ)"),
        ];
        for (severity, label) in bands {
            let n = count(severity);
            if n > 0 {
                out.push_str(&format!("  {}: {}\n", label, n));
            }
        }
        out
    }
}
