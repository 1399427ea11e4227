// Temporal dynamics of a metric around an event anchor
//
// Pipeline for one series (each stage optional except the split):
// 1. partition into before/after windows
// 2. outlier filtering per window
// 3. daily regularization with bounded gap interpolation
// 4. decay-weighted before/after means (fixed or adaptive half-life)
// 5. sliding-window trends and impact persistence
// 6. change points over the sliding windows
// 7. anomalies against the pre-event baseline
// 8. gap-based clustering into episodes

mod anomaly;
mod change_point;
mod decay;
mod irregular;
mod sliding;
mod strategy;

pub use anomaly::{classify_severity, Anomaly, AnomalyDetector, AnomalySeverity, AnomalySpec};
pub use change_point::{ChangeKind, ChangePoint, ChangePointDetector, WindowTripleDetector};
pub use decay::{AdaptiveDecay, DecayFunction, DecayStrategy, DecayType};
pub use irregular::{regularize, CoverageReport, DailyPoint, Gap, IrregularSpec, RegularizedSeries};
pub use sliding::{
    analyze_sliding, impact_persistence, sliding_windows, ImpactPersistence, SlidingAnalysis,
    SlidingSpec, WindowStat,
};
pub use strategy::{
    ClusteringStrategy, GapClustering, IqrFilter, OutlierFilter, OutlierFilterSpec,
    TemporalCluster, ZScoreFilter,
};

use crate::descriptive::mean;
use crate::error::{ImpactError, Result};
use crate::window::{TimedValue, WindowSpec};
use chrono::{DateTime, Utc};
use decay::weighted_split;
use serde::{Deserialize, Serialize};

/// Which temporal analyses to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSpec {
    pub window: WindowSpec,
    pub decay: Option<DecayFunction>,
    /// Replaces the decay half-life with the best of a candidate set
    pub adaptive_decay: Option<AdaptiveDecay>,
    pub sliding: Option<SlidingSpec>,
    pub change_points: Option<WindowTripleDetector>,
    pub irregular: Option<IrregularSpec>,
    pub outlier_filter: Option<OutlierFilterSpec>,
    pub clustering: Option<GapClustering>,
    pub anomaly: Option<AnomalySpec>,
}

impl Default for TemporalSpec {
    fn default() -> Self {
        Self {
            window: WindowSpec::default(),
            decay: Some(DecayFunction::default()),
            adaptive_decay: None,
            sliding: Some(SlidingSpec::default()),
            change_points: Some(WindowTripleDetector::default()),
            irregular: None,
            outlier_filter: None,
            clustering: None,
            anomaly: Some(AnomalySpec::default()),
        }
    }
}

impl TemporalSpec {
    pub fn decay_only(window: WindowSpec, decay: DecayFunction) -> Self {
        Self {
            window,
            decay: Some(decay),
            adaptive_decay: None,
            sliding: None,
            change_points: None,
            irregular: None,
            outlier_filter: None,
            clustering: None,
            anomaly: None,
        }
    }

    pub fn sliding_only(window: WindowSpec, sliding: SlidingSpec) -> Self {
        Self {
            decay: None,
            sliding: Some(sliding),
            ..Self::decay_only(window, DecayFunction::default())
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.decay.is_none() && self.sliding.is_none() {
            return Err("temporal analysis needs a decay function or a sliding window".to_string());
        }
        self.window.validate()?;
        if let Some(decay) = &self.decay {
            decay.validate()?;
        }
        if let Some(sliding) = &self.sliding {
            sliding.validate()?;
        }
        if let Some(detector) = &self.change_points {
            detector.validate()?;
        }
        if let Some(irregular) = &self.irregular {
            irregular.validate()?;
        }
        if let Some(filter) = &self.outlier_filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Result of the temporal pipeline for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedImpactResult {
    pub anchor: DateTime<Utc>,
    /// Decay actually applied (after adaptive selection)
    pub decay: Option<DecayFunction>,
    pub weighted_before_mean: f64,
    pub weighted_after_mean: f64,
    pub weighted_impact: f64,
    pub impact_standard_error: f64,
    pub unweighted_before_mean: f64,
    pub unweighted_after_mean: f64,
    pub unweighted_impact: f64,
    pub n_before: usize,
    pub n_after: usize,
    pub effective_n_before: f64,
    pub effective_n_after: f64,
    pub sliding: Option<SlidingAnalysis>,
    pub change_points: Vec<ChangePoint>,
    pub anomalies: Vec<Anomaly>,
    pub coverage: Option<CoverageReport>,
    pub outliers_removed: usize,
    pub clusters: Vec<TemporalCluster>,
    pub warnings: Vec<String>,
}

impl WeightedImpactResult {
    pub fn persistence(&self) -> Option<&ImpactPersistence> {
        self.sliding.as_ref().and_then(|s| s.persistence.as_ref())
    }
}

/// Equal weights; used when only sliding analysis was requested
struct Uniform;

impl DecayStrategy for Uniform {
    fn weight(&self, _days_from_event: f64) -> f64 {
        1.0
    }

    fn name(&self) -> &'static str {
        "uniform"
    }
}

fn with_confidence(points: &[TimedValue]) -> Vec<(TimedValue, f64)> {
    points.iter().map(|p| (*p, 1.0)).collect()
}

fn values_of(points: &[(TimedValue, f64)]) -> Vec<f64> {
    points.iter().map(|(p, _)| p.value).collect()
}

/// Run the temporal pipeline on one series around `anchor`
pub fn analyze_series(
    series: &[TimedValue],
    anchor: DateTime<Utc>,
    spec: &TemporalSpec,
) -> Result<WeightedImpactResult> {
    spec.validate().map_err(ImpactError::Validation)?;

    let pair = spec.window.partition(anchor, series);
    if pair.before.is_empty() || pair.after.is_empty() {
        return Err(ImpactError::InsufficientData {
            required: 1,
            actual: pair.before.len().min(pair.after.len()),
        });
    }

    let mut warnings = Vec::new();
    let mut before_points = pair.before.points;
    let mut after_points = pair.after.points;

    let mut outliers_removed = 0;
    if let Some(filter_spec) = &spec.outlier_filter {
        let filter = filter_spec.build();
        let (kept_before, removed_before) = filter.filter(&before_points);
        let (kept_after, removed_after) = filter.filter(&after_points);
        outliers_removed = removed_before + removed_after;
        before_points = kept_before;
        after_points = kept_after;
        if outliers_removed > 0 {
            tracing::debug!(outliers_removed, "outlier filter applied");
        }
    }

    let (before, after, coverage) = match &spec.irregular {
        Some(irregular) => {
            let mut all = before_points.clone();
            all.extend_from_slice(&after_points);
            let regular = regularize(&all, anchor, &spec.window, irregular);
            warnings.extend(regular.warnings);
            let (b, a): (Vec<DailyPoint>, Vec<DailyPoint>) =
                regular.points.into_iter().partition(|p| p.day < 0);
            let to_pairs = |pts: Vec<DailyPoint>| -> Vec<(TimedValue, f64)> {
                pts.iter().map(|p| (p.as_timed(), p.confidence)).collect()
            };
            (to_pairs(b), to_pairs(a), Some(regular.coverage))
        }
        None => (
            with_confidence(&before_points),
            with_confidence(&after_points),
            None,
        ),
    };

    if before.is_empty() || after.is_empty() {
        return Err(ImpactError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let decay = match (&spec.decay, &spec.adaptive_decay) {
        (Some(template), Some(adaptive)) => Some(adaptive.select(template, anchor, &before, &after)),
        (Some(template), None) => Some(*template),
        (None, _) => None,
    };

    let mut split = match &decay {
        Some(function) => weighted_split(function, anchor, &before, &after),
        None => weighted_split(&Uniform, anchor, &before, &after),
    };
    if split.before_ess <= 0.0 || split.after_ess <= 0.0 {
        warnings.push(
            "Decay weights vanish on one side of the anchor; using unweighted means".to_string(),
        );
        split = weighted_split(&Uniform, anchor, &before, &after);
    }

    let before_values = values_of(&before);
    let after_values = values_of(&after);
    let unweighted_before_mean = mean(&before_values);
    let unweighted_after_mean = mean(&after_values);

    let before_timed: Vec<TimedValue> = before.iter().map(|(p, _)| *p).collect();
    let after_timed: Vec<TimedValue> = after.iter().map(|(p, _)| *p).collect();

    let sliding_spec = spec
        .sliding
        .or_else(|| spec.change_points.map(|_| SlidingSpec::default()));
    let sliding = sliding_spec
        .map(|s| analyze_sliding(&before_timed, &after_timed, anchor, &spec.window, &s));

    let change_points = match (&spec.change_points, &sliding) {
        (Some(detector), Some(analysis)) => detector.detect(&analysis.windows),
        _ => Vec::new(),
    };

    let anomalies = match &spec.anomaly {
        Some(anomaly_spec) => {
            let mut detector = AnomalyDetector::from_baseline(&before_values, anomaly_spec.threshold);
            if !detector.is_ready() {
                warnings.push(format!(
                    "Only {} baseline observations; anomaly detection skipped",
                    before_values.len()
                ));
            }
            detector.scan(&after_timed)
        }
        None => Vec::new(),
    };

    let clusters = match &spec.clustering {
        Some(strategy) => {
            let mut all = before_timed.clone();
            all.extend_from_slice(&after_timed);
            strategy.cluster(&all)
        }
        None => Vec::new(),
    };

    Ok(WeightedImpactResult {
        anchor,
        decay,
        weighted_before_mean: split.before_mean,
        weighted_after_mean: split.after_mean,
        weighted_impact: split.after_mean - split.before_mean,
        impact_standard_error: split.impact_variance.sqrt(),
        unweighted_before_mean,
        unweighted_after_mean,
        unweighted_impact: unweighted_after_mean - unweighted_before_mean,
        n_before: before.len(),
        n_after: after.len(),
        effective_n_before: split.before_ess,
        effective_n_after: split.after_ess,
        sliding,
        change_points,
        anomalies,
        coverage,
        outliers_removed,
        clusters,
        warnings,
    })
}
