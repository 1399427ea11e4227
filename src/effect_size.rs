//! Standardized effect sizes for before/after comparisons
//!
//! Sign convention: every estimate is oriented as `after - before`, so a
//! negative Cohen's d means the metric decreased after the event. Direction is
//! reported separately from the magnitude bucket, which looks at `|value|`.

use crate::descriptive::{mean, pooled_variance, rank_with_ties, std_dev};
use crate::dist::{normal_cdf, z_critical};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorical magnitude of a standardized effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    Negligible,
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl Magnitude {
    /// Bucket `|value|` with the fixed thresholds 0.1 / 0.3 / 0.5 / 0.8
    pub fn from_value(value: f64) -> Self {
        let v = value.abs();
        if v < 0.1 {
            Magnitude::Negligible
        } else if v < 0.3 {
            Magnitude::Small
        } else if v < 0.5 {
            Magnitude::Medium
        } else if v < 0.8 {
            Magnitude::Large
        } else {
            Magnitude::VeryLarge
        }
    }

    pub fn is_at_least(self, other: Magnitude) -> bool {
        self >= other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Magnitude::Negligible => "negligible",
            Magnitude::Small => "small",
            Magnitude::Medium => "medium",
            Magnitude::Large => "large",
            Magnitude::VeryLarge => "very_large",
        }
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the shift from before to after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    NoChange,
}

impl Direction {
    pub fn from_difference(difference: f64) -> Self {
        if difference > 1e-12 {
            Direction::Increase
        } else if difference < -1e-12 {
            Direction::Decrease
        } else {
            Direction::NoChange
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
            Direction::NoChange => "no_change",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point estimate with confidence interval and magnitude bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectEstimate {
    pub value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub magnitude: Magnitude,
}

impl EffectEstimate {
    fn new(value: f64, standard_error: f64, z: f64) -> Self {
        Self {
            value,
            ci_lower: value - z * standard_error,
            ci_upper: value + z * standard_error,
            magnitude: Magnitude::from_value(value),
        }
    }

    fn zero() -> Self {
        Self {
            value: 0.0,
            ci_lower: 0.0,
            ci_upper: 0.0,
            magnitude: Magnitude::Negligible,
        }
    }

    pub fn contains_zero(&self) -> bool {
        self.ci_lower <= 0.0 && self.ci_upper >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSizeOptions {
    pub confidence_level: f64,
}

impl Default for EffectSizeOptions {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
        }
    }
}

impl EffectSizeOptions {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            ));
        }
        Ok(())
    }
}

/// All effect sizes for one before/after comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSizeBundle {
    pub cohens_d: EffectEstimate,
    pub hedges_g: EffectEstimate,
    /// Glass's Δ standardized by the before-window standard deviation
    pub glass_delta_before: EffectEstimate,
    /// Glass's Δ standardized by the after-window standard deviation
    pub glass_delta_after: EffectEstimate,
    pub rank_biserial: EffectEstimate,
    /// Φ(d/√2): probability a random after value exceeds a random before value
    pub probability_of_superiority: f64,
    pub common_language: EffectEstimate,
    /// Share of (before, after) pairs where after is larger (ties count half)
    pub empirical_superiority: f64,
    pub direction: Direction,
    pub n_before: usize,
    pub n_after: usize,
    pub warnings: Vec<String>,
}

/// Cohen's d with pooled standard deviation; zero when the pooled SD is zero
pub fn cohens_d(before: &[f64], after: &[f64]) -> f64 {
    let pooled_sd = pooled_variance(before, after).sqrt();
    if pooled_sd <= f64::EPSILON {
        return 0.0;
    }
    (mean(after) - mean(before)) / pooled_sd
}

/// Small-sample correction factor J = 1 - 3/(4·df - 1)
pub fn hedges_correction(n_before: usize, n_after: usize) -> f64 {
    let df = (n_before + n_after) as f64 - 2.0;
    if df < 1.0 {
        return 1.0;
    }
    1.0 - 3.0 / (4.0 * df - 1.0)
}

/// Glass's Δ using `reference` as the standardizer
pub fn glass_delta(before: &[f64], after: &[f64], reference: &[f64]) -> f64 {
    let sd = std_dev(reference);
    if sd <= f64::EPSILON {
        return 0.0;
    }
    (mean(after) - mean(before)) / sd
}

/// Mann-Whitney U for each group: (U_before, U_after)
///
/// `U_before` counts pairs where the before value is larger; the two always
/// sum to `n_before · n_after`.
pub fn mann_whitney_u(before: &[f64], after: &[f64]) -> (f64, f64) {
    let n1 = before.len() as f64;
    let n2 = after.len() as f64;
    let mut combined = before.to_vec();
    combined.extend_from_slice(after);
    let ranks = rank_with_ties(&combined);

    let r1: f64 = ranks[..before.len()].iter().sum();
    let r2: f64 = ranks[before.len()..].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u2 = r2 - n2 * (n2 + 1.0) / 2.0;
    (u1, u2)
}

/// Rank-biserial correlation oriented as after-over-before, in `[-1, 1]`
pub fn rank_biserial(u_before: f64, u_after: f64) -> f64 {
    let total = u_before + u_after;
    if total <= 0.0 {
        return 0.0;
    }
    (u_after - u_before) / total
}

/// Compute every effect size for a before/after pair
pub fn compute_effect_sizes(
    before: &[f64],
    after: &[f64],
    options: &EffectSizeOptions,
) -> EffectSizeBundle {
    let n1 = before.len();
    let n2 = after.len();
    let mut warnings = Vec::new();

    if n1 < 2 || n2 < 2 {
        warnings.push(format!(
            "Insufficient data for effect sizes (n_before={}, n_after={}, need >= 2 each); reporting zero effect",
            n1, n2
        ));
        return EffectSizeBundle {
            cohens_d: EffectEstimate::zero(),
            hedges_g: EffectEstimate::zero(),
            glass_delta_before: EffectEstimate::zero(),
            glass_delta_after: EffectEstimate::zero(),
            rank_biserial: EffectEstimate::zero(),
            probability_of_superiority: 0.5,
            common_language: EffectEstimate {
                value: 0.5,
                ci_lower: 0.5,
                ci_upper: 0.5,
                magnitude: Magnitude::Negligible,
            },
            empirical_superiority: 0.5,
            direction: Direction::from_difference(mean(after) - mean(before)),
            n_before: n1,
            n_after: n2,
            warnings,
        };
    }

    let z = z_critical(options.confidence_level);
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let difference = mean(after) - mean(before);

    if pooled_variance(before, after) <= f64::EPSILON {
        warnings.push(
            "Zero pooled variance: standardized effect sizes set to 0".to_string(),
        );
    }

    let d = cohens_d(before, after);
    let se_d = ((n1f + n2f) / (n1f * n2f) + d * d / (2.0 * (n1f + n2f))).sqrt();

    let j = hedges_correction(n1, n2);
    let g = d * j;

    let glass_se = |delta: f64, n_ref: f64| {
        ((n1f + n2f) / (n1f * n2f) + delta * delta / (2.0 * (n_ref - 1.0))).sqrt()
    };
    let delta_before = glass_delta(before, after, before);
    let delta_after = glass_delta(before, after, after);
    if std_dev(before) <= f64::EPSILON || std_dev(after) <= f64::EPSILON {
        warnings.push(
            "A window has zero variance: the corresponding Glass's delta is set to 0".to_string(),
        );
    }

    let (u_before, u_after) = mann_whitney_u(before, after);
    let r = rank_biserial(u_before, u_after);
    let se_r = ((n1f + n2f + 1.0) / (3.0 * n1f * n2f)).sqrt();
    let mut r_estimate = EffectEstimate::new(r, se_r, z);
    r_estimate.ci_lower = r_estimate.ci_lower.max(-1.0);
    r_estimate.ci_upper = r_estimate.ci_upper.min(1.0);

    let cohens = EffectEstimate::new(d, se_d, z);
    let superiority = normal_cdf(d / std::f64::consts::SQRT_2);
    let common_language = EffectEstimate {
        value: superiority,
        ci_lower: normal_cdf(cohens.ci_lower / std::f64::consts::SQRT_2),
        ci_upper: normal_cdf(cohens.ci_upper / std::f64::consts::SQRT_2),
        magnitude: cohens.magnitude,
    };

    if n1 < crate::window::MIN_RELIABLE_SAMPLE || n2 < crate::window::MIN_RELIABLE_SAMPLE {
        warnings.push(format!(
            "Small samples (n_before={}, n_after={}): effect size intervals are approximate",
            n1, n2
        ));
    }

    EffectSizeBundle {
        cohens_d: cohens,
        hedges_g: EffectEstimate::new(g, se_d * j, z),
        glass_delta_before: EffectEstimate::new(delta_before, glass_se(delta_before, n1f), z),
        glass_delta_after: EffectEstimate::new(delta_after, glass_se(delta_after, n2f), z),
        rank_biserial: r_estimate,
        probability_of_superiority: superiority,
        common_language,
        empirical_superiority: u_after / (n1f * n2f),
        direction: Direction::from_difference(difference),
        n_before: n1,
        n_after: n2,
        warnings,
    }
}
