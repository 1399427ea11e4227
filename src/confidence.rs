//! Confidence intervals for the before/after difference
//!
//! The statistic is `after - before` in every method. Parametric and robust
//! intervals are closed form; the two bootstrap variants share one set of
//! draws from the injected `Resampler`.

use crate::descriptive::{
    mean, median, quantile_sorted, std_dev, trim_count, trimmed_mean, variance,
    winsorized_variance,
};
use crate::dist::{normal_cdf, normal_quantile, t_critical, z_critical};
use crate::error::{ImpactError, Result};
use crate::sampling::{resampled_mean, Resampler};
use crate::window::MIN_TEST_SAMPLE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Asymptotic SE inflation of the median relative to the mean (√(π/2))
pub const MEDIAN_SE_MULTIPLIER: f64 = 1.253;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiMethod {
    Parametric,
    Bootstrap,
    BiasCorrectedBootstrap,
    TrimmedMean,
    Median,
}

impl CiMethod {
    pub fn all() -> Vec<CiMethod> {
        vec![
            CiMethod::Parametric,
            CiMethod::Bootstrap,
            CiMethod::BiasCorrectedBootstrap,
            CiMethod::TrimmedMean,
            CiMethod::Median,
        ]
    }

    fn needs_bootstrap(&self) -> bool {
        matches!(self, CiMethod::Bootstrap | CiMethod::BiasCorrectedBootstrap)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CiMethod::Parametric => "parametric",
            CiMethod::Bootstrap => "bootstrap",
            CiMethod::BiasCorrectedBootstrap => "bias_corrected_bootstrap",
            CiMethod::TrimmedMean => "trimmed_mean",
            CiMethod::Median => "median",
        }
    }
}

impl fmt::Display for CiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CiMethod {
    type Err = ImpactError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "parametric" | "t" => Ok(CiMethod::Parametric),
            "bootstrap" | "percentile" => Ok(CiMethod::Bootstrap),
            "bca" | "bias_corrected" | "bias_corrected_bootstrap" => {
                Ok(CiMethod::BiasCorrectedBootstrap)
            }
            "trimmed" | "trimmed_mean" => Ok(CiMethod::TrimmedMean),
            "median" => Ok(CiMethod::Median),
            _ => Err(ImpactError::unsupported("confidence interval", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiOptions {
    pub confidence_level: f64,
    pub bootstrap_iterations: usize,
    /// Symmetric trim fraction for the trimmed-mean interval
    pub trim_fraction: f64,
}

impl Default for CiOptions {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            bootstrap_iterations: 10_000,
            trim_fraction: 0.2,
        }
    }
}

impl CiOptions {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            ));
        }
        if self.bootstrap_iterations < 100 {
            return Err(format!(
                "bootstrap_iterations must be at least 100, got {}",
                self.bootstrap_iterations
            ));
        }
        if !(0.0..0.5).contains(&self.trim_fraction) {
            return Err(format!(
                "trim_fraction must be in [0, 0.5), got {}",
                self.trim_fraction
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub method: CiMethod,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    pub standard_error: f64,
    /// Bootstrap bias (mean of draws minus point estimate); zero otherwise
    pub bias: f64,
    pub confidence_level: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn excludes_zero(&self) -> bool {
        !self.contains(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiBundle {
    pub intervals: Vec<ConfidenceInterval>,
    pub warnings: Vec<String>,
}

impl CiBundle {
    pub fn get(&self, method: CiMethod) -> Option<&ConfidenceInterval> {
        self.intervals.iter().find(|ci| ci.method == method)
    }
}

/// Compute the requested intervals for `after - before`
///
/// Requires at least two observations per side. Bootstrap loops propagate
/// `ImpactError::Cancelled` when their cancel flag is raised.
pub fn compute_confidence_intervals(
    before: &[f64],
    after: &[f64],
    methods: &[CiMethod],
    options: &CiOptions,
    resampler: &mut Resampler,
) -> Result<CiBundle> {
    options.validate().map_err(ImpactError::Validation)?;
    if methods.is_empty() {
        return Err(ImpactError::Validation(
            "at least one confidence interval method is required".to_string(),
        ));
    }
    let smallest = before.len().min(after.len());
    if smallest < MIN_TEST_SAMPLE {
        return Err(ImpactError::InsufficientData {
            required: MIN_TEST_SAMPLE,
            actual: smallest,
        });
    }

    let mut methods = methods.to_vec();
    methods.sort();
    methods.dedup();

    let draws = if methods.iter().any(CiMethod::needs_bootstrap) {
        let mut draws = resampler.run(options.bootstrap_iterations, |rng| {
            resampled_mean(rng, after) - resampled_mean(rng, before)
        })?;
        draws.sort_by(f64::total_cmp);
        draws
    } else {
        Vec::new()
    };

    let mut intervals = Vec::with_capacity(methods.len());
    let mut warnings = Vec::new();
    for method in methods {
        let interval = match method {
            CiMethod::Parametric => parametric(before, after, options),
            CiMethod::Bootstrap => percentile_bootstrap(before, after, &draws, options),
            CiMethod::BiasCorrectedBootstrap => bca_bootstrap(before, after, &draws, options),
            CiMethod::TrimmedMean => match trimmed(before, after, options) {
                Some(ci) => ci,
                None => {
                    warnings.push(format!(
                        "Trim fraction {} leaves too few observations for a trimmed-mean interval",
                        options.trim_fraction
                    ));
                    continue;
                }
            },
            CiMethod::Median => median_based(before, after, options),
        };
        if interval.standard_error <= f64::EPSILON {
            warnings.push(format!(
                "{} interval has zero width: both windows are constant",
                method
            ));
        }
        intervals.push(interval);
    }

    Ok(CiBundle {
        intervals,
        warnings,
    })
}

fn welch_df(v1: f64, n1: f64, v2: f64, n2: f64) -> f64 {
    let (a, b) = (v1 / n1, v2 / n2);
    let denom = a * a / (n1 - 1.0) + b * b / (n2 - 1.0);
    if denom > 0.0 {
        (a + b).powi(2) / denom
    } else {
        n1 + n2 - 2.0
    }
}

fn parametric(before: &[f64], after: &[f64], options: &CiOptions) -> ConfidenceInterval {
    let (n1, n2) = (before.len() as f64, after.len() as f64);
    let (v1, v2) = (variance(before), variance(after));
    let estimate = mean(after) - mean(before);
    let standard_error = (v1 / n1 + v2 / n2).sqrt();
    let critical = t_critical(options.confidence_level, welch_df(v1, n1, v2, n2));
    ConfidenceInterval {
        method: CiMethod::Parametric,
        estimate,
        lower: estimate - critical * standard_error,
        upper: estimate + critical * standard_error,
        standard_error,
        bias: 0.0,
        confidence_level: options.confidence_level,
    }
}

fn percentile_bootstrap(
    before: &[f64],
    after: &[f64],
    sorted_draws: &[f64],
    options: &CiOptions,
) -> ConfidenceInterval {
    let estimate = mean(after) - mean(before);
    let tail = (1.0 - options.confidence_level) / 2.0;
    ConfidenceInterval {
        method: CiMethod::Bootstrap,
        estimate,
        lower: quantile_sorted(sorted_draws, tail),
        upper: quantile_sorted(sorted_draws, 1.0 - tail),
        standard_error: std_dev(sorted_draws),
        bias: mean(sorted_draws) - estimate,
        confidence_level: options.confidence_level,
    }
}

/// Jackknife acceleration over leave-one-out mean differences
fn jackknife_acceleration(before: &[f64], after: &[f64]) -> f64 {
    let (n1, n2) = (before.len() as f64, after.len() as f64);
    let (sum1, sum2) = (before.iter().sum::<f64>(), after.iter().sum::<f64>());
    let (m1, m2) = (sum1 / n1, sum2 / n2);

    let mut leave_one_out = Vec::with_capacity(before.len() + after.len());
    leave_one_out.extend(before.iter().map(|x| m2 - (sum1 - x) / (n1 - 1.0)));
    leave_one_out.extend(after.iter().map(|x| (sum2 - x) / (n2 - 1.0) - m1));

    let centre = mean(&leave_one_out);
    let (mut num, mut den) = (0.0, 0.0);
    for theta in &leave_one_out {
        let d = centre - theta;
        num += d * d * d;
        den += d * d;
    }
    if den <= f64::EPSILON {
        return 0.0;
    }
    num / (6.0 * den.powf(1.5))
}

fn bca_bootstrap(
    before: &[f64],
    after: &[f64],
    sorted_draws: &[f64],
    options: &CiOptions,
) -> ConfidenceInterval {
    let estimate = mean(after) - mean(before);
    let b = sorted_draws.len() as f64;
    let below = sorted_draws.partition_point(|&d| d < estimate) as f64;
    let proportion = (below / b).clamp(1.0 / (b + 1.0), b / (b + 1.0));
    let z0 = normal_quantile(proportion);
    let accel = jackknife_acceleration(before, after);

    let tail = (1.0 - options.confidence_level) / 2.0;
    let adjust = |z_tail: f64| {
        let shifted = z0 + z_tail;
        let denom = 1.0 - accel * shifted;
        if denom.abs() <= f64::EPSILON {
            return normal_cdf(z_tail);
        }
        normal_cdf(z0 + shifted / denom)
    };
    let lower_q = adjust(normal_quantile(tail));
    let upper_q = adjust(normal_quantile(1.0 - tail));

    ConfidenceInterval {
        method: CiMethod::BiasCorrectedBootstrap,
        estimate,
        lower: quantile_sorted(sorted_draws, lower_q),
        upper: quantile_sorted(sorted_draws, upper_q),
        standard_error: std_dev(sorted_draws),
        bias: mean(sorted_draws) - estimate,
        confidence_level: options.confidence_level,
    }
}

/// Yuen's trimmed-mean interval; `None` when trimming leaves < 2 per side
fn trimmed(before: &[f64], after: &[f64], options: &CiOptions) -> Option<ConfidenceInterval> {
    let fraction = options.trim_fraction;
    let component = |data: &[f64]| -> Option<(f64, f64)> {
        let n = data.len();
        let h = n - 2 * trim_count(n, fraction);
        if h < 2 {
            return None;
        }
        let h = h as f64;
        let d = (n as f64 - 1.0) * winsorized_variance(data, fraction) / (h * (h - 1.0));
        Some((d, h))
    };
    let (d1, h1) = component(before)?;
    let (d2, h2) = component(after)?;

    let estimate = trimmed_mean(after, fraction) - trimmed_mean(before, fraction);
    let standard_error = (d1 + d2).sqrt();
    let denom = d1 * d1 / (h1 - 1.0) + d2 * d2 / (h2 - 1.0);
    let df = if denom > 0.0 {
        (d1 + d2).powi(2) / denom
    } else {
        h1 + h2 - 2.0
    };
    let critical = t_critical(options.confidence_level, df);

    Some(ConfidenceInterval {
        method: CiMethod::TrimmedMean,
        estimate,
        lower: estimate - critical * standard_error,
        upper: estimate + critical * standard_error,
        standard_error,
        bias: 0.0,
        confidence_level: options.confidence_level,
    })
}

fn median_based(before: &[f64], after: &[f64], options: &CiOptions) -> ConfidenceInterval {
    let (n1, n2) = (before.len() as f64, after.len() as f64);
    let estimate = median(after) - median(before);
    let standard_error =
        MEDIAN_SE_MULTIPLIER * (variance(before) / n1 + variance(after) / n2).sqrt();
    let z = z_critical(options.confidence_level);
    ConfidenceInterval {
        method: CiMethod::Median,
        estimate,
        lower: estimate - z * standard_error,
        upper: estimate + z * standard_error,
        standard_error,
        bias: 0.0,
        confidence_level: options.confidence_level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE: [f64; 8] = [0.80, 0.75, 0.82, 0.78, 0.81, 0.79, 0.77, 0.83];
    const AFTER: [f64; 8] = [0.60, 0.62, 0.58, 0.65, 0.61, 0.63, 0.59, 0.64];

    fn options() -> CiOptions {
        CiOptions {
            bootstrap_iterations: 2000,
            ..CiOptions::default()
        }
    }

    #[test]
    fn test_all_methods_bracket_the_drop() {
        let bundle = compute_confidence_intervals(
            &BEFORE,
            &AFTER,
            &CiMethod::all(),
            &options(),
            &mut Resampler::seeded(42),
        )
        .unwrap();
        assert_eq!(bundle.intervals.len(), 5);
        for ci in &bundle.intervals {
            assert!(ci.lower <= ci.upper, "{}", ci.method);
            assert!(ci.upper < 0.0, "{} should exclude zero", ci.method);
            assert!(ci.excludes_zero());
        }
        let parametric = bundle.get(CiMethod::Parametric).unwrap();
        assert!(parametric.contains(mean(&AFTER) - mean(&BEFORE)));
    }

    #[test]
    fn test_bootstrap_is_reproducible() {
        let run = |seed| {
            compute_confidence_intervals(
                &BEFORE,
                &AFTER,
                &[CiMethod::Bootstrap],
                &options(),
                &mut Resampler::seeded(seed),
            )
            .unwrap()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_bootstrap_bias_is_small_for_mean() {
        let bundle = compute_confidence_intervals(
            &BEFORE,
            &AFTER,
            &[CiMethod::Bootstrap],
            &options(),
            &mut Resampler::seeded(3),
        )
        .unwrap();
        let ci = bundle.get(CiMethod::Bootstrap).unwrap();
        assert!(ci.bias.abs() < 0.01);
    }

    #[test]
    fn test_median_interval_is_wider_than_parametric_se() {
        let bundle = compute_confidence_intervals(
            &BEFORE,
            &AFTER,
            &[CiMethod::Parametric, CiMethod::Median],
            &options(),
            &mut Resampler::seeded(1),
        )
        .unwrap();
        let p = bundle.get(CiMethod::Parametric).unwrap();
        let m = bundle.get(CiMethod::Median).unwrap();
        assert!((m.standard_error / p.standard_error - MEDIAN_SE_MULTIPLIER).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_data_is_an_error() {
        let err = compute_confidence_intervals(
            &[1.0],
            &AFTER,
            &[CiMethod::Parametric],
            &options(),
            &mut Resampler::seeded(1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ImpactError::InsufficientData {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_constant_windows_warn() {
        let bundle = compute_confidence_intervals(
            &[1.0, 1.0, 1.0],
            &[2.0, 2.0, 2.0],
            &[CiMethod::Parametric],
            &options(),
            &mut Resampler::seeded(1),
        )
        .unwrap();
        assert!(!bundle.warnings.is_empty());
        let ci = bundle.get(CiMethod::Parametric).unwrap();
        assert_eq!(ci.lower, 1.0);
        assert_eq!(ci.upper, 1.0);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "bca".parse::<CiMethod>().unwrap(),
            CiMethod::BiasCorrectedBootstrap
        );
        assert!("jackknife".parse::<CiMethod>().is_err());
    }
}
