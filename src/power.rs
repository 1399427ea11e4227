//! Power analysis for two-sample comparisons
//!
//! Normal approximation throughout: `n_per_group = 2·((z_α + z_β)/d)²`,
//! achieved power `Φ(|d|·√(n/2) − z_α)` plus the opposite tail when
//! two-sided, and the minimum detectable effect `(z_α + z_β)·√(2/n)`.

use crate::dist::{normal_cdf, normal_quantile};
use crate::error::{ImpactError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest per-group size reported
const MIN_GROUP_SIZE: usize = 2;

/// Points in a generated power curve
const CURVE_POINTS: usize = 20;

/// Largest per-group size the sample-size solver will report
const MAX_GROUP_SIZE: usize = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveFor {
    SampleSize,
    Power,
    EffectSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tails {
    One,
    Two,
}

impl Tails {
    pub fn count(&self) -> f64 {
        match self {
            Tails::One => 1.0,
            Tails::Two => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerInterpretation {
    Underpowered,
    Borderline,
    Adequate,
}

impl PowerInterpretation {
    pub fn from_power(power: f64) -> Self {
        if power < 0.6 {
            PowerInterpretation::Underpowered
        } else if power < 0.8 {
            PowerInterpretation::Borderline
        } else {
            PowerInterpretation::Adequate
        }
    }
}

impl fmt::Display for PowerInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerInterpretation::Underpowered => "underpowered",
            PowerInterpretation::Borderline => "borderline",
            PowerInterpretation::Adequate => "adequate",
        };
        f.write_str(s)
    }
}

/// Inputs of a power calculation; the field named by `solve_for` is ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSpec {
    pub effect_size: Option<f64>,
    pub alpha: f64,
    pub power: Option<f64>,
    pub sample_size_per_group: Option<usize>,
    pub tails: Tails,
    pub solve_for: SolveFor,
}

impl PowerSpec {
    pub fn sample_size(effect_size: f64, alpha: f64, power: f64) -> Self {
        Self {
            effect_size: Some(effect_size),
            alpha,
            power: Some(power),
            sample_size_per_group: None,
            tails: Tails::Two,
            solve_for: SolveFor::SampleSize,
        }
    }

    pub fn achieved_power(effect_size: f64, alpha: f64, n_per_group: usize) -> Self {
        Self {
            effect_size: Some(effect_size),
            alpha,
            power: None,
            sample_size_per_group: Some(n_per_group),
            tails: Tails::Two,
            solve_for: SolveFor::Power,
        }
    }

    pub fn minimum_detectable_effect(alpha: f64, power: f64, n_per_group: usize) -> Self {
        Self {
            effect_size: None,
            alpha,
            power: Some(power),
            sample_size_per_group: Some(n_per_group),
            tails: Tails::Two,
            solve_for: SolveFor::EffectSize,
        }
    }

    pub fn with_tails(mut self, tails: Tails) -> Self {
        self.tails = tails;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerCurvePoint {
    pub sample_size_per_group: usize,
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerResult {
    pub solve_for: SolveFor,
    pub effect_size: f64,
    pub alpha: f64,
    pub power: f64,
    pub tails: Tails,
    /// Unrounded per-group size from the closed form
    pub exact_sample_size: f64,
    pub sample_size_per_group: usize,
    pub total_sample_size: usize,
    pub interpretation: PowerInterpretation,
    pub curve: Vec<PowerCurvePoint>,
    pub warnings: Vec<String>,
}

fn z_alpha(alpha: f64, tails: Tails) -> f64 {
    normal_quantile(1.0 - alpha / tails.count())
}

/// Power of a two-sample test with `n` observations per group
pub fn power_at(effect_size: f64, alpha: f64, n_per_group: f64, tails: Tails) -> f64 {
    let za = z_alpha(alpha, tails);
    let shift = effect_size.abs() * (n_per_group / 2.0).sqrt();
    let power = match tails {
        Tails::One => normal_cdf(shift - za),
        Tails::Two => normal_cdf(shift - za) + normal_cdf(-shift - za),
    };
    power.clamp(0.0, 1.0)
}

/// Unrounded per-group sample size for a target power
///
/// Zero when the target power does not exceed the false-positive rate
/// `alpha / tails`; any sample reaches it.
pub fn required_sample_size(effect_size: f64, alpha: f64, power: f64, tails: Tails) -> f64 {
    let sum = (z_alpha(alpha, tails) + normal_quantile(power)).max(0.0);
    2.0 * (sum / effect_size.abs()).powi(2)
}

/// Smallest |d| detectable with the given power and per-group size
pub fn minimum_detectable_effect(alpha: f64, power: f64, n_per_group: f64, tails: Tails) -> f64 {
    (z_alpha(alpha, tails) + normal_quantile(power)).max(0.0) * (2.0 / n_per_group).sqrt()
}

/// Post-hoc power for an observed effect with unequal group sizes
///
/// Uses the harmonic-mean group size `2·n1·n2/(n1+n2)`.
pub fn observed_power(effect_size: f64, n_before: usize, n_after: usize, alpha: f64) -> f64 {
    if n_before == 0 || n_after == 0 {
        return 0.0;
    }
    let (n1, n2) = (n_before as f64, n_after as f64);
    power_at(effect_size, alpha, 2.0 * n1 * n2 / (n1 + n2), Tails::Two)
}

fn check_probability(name: &str, value: f64) -> Result<f64> {
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(ImpactError::Validation(format!(
            "{} must be in (0, 1), got {}",
            name, value
        )))
    }
}

fn require<T>(value: Option<T>, name: &str, solve_for: SolveFor) -> Result<T> {
    value.ok_or_else(|| {
        ImpactError::Validation(format!("{} is required when solving for {:?}", name, solve_for))
    })
}

fn check_effect(effect_size: f64) -> Result<f64> {
    if effect_size.is_finite() && effect_size.abs() > 1e-12 {
        Ok(effect_size)
    } else {
        Err(ImpactError::Validation(format!(
            "effect_size must be a non-zero finite number, got {}",
            effect_size
        )))
    }
}

fn check_group_size(n: usize) -> Result<usize> {
    if n >= MIN_GROUP_SIZE {
        Ok(n)
    } else {
        Err(ImpactError::InsufficientData {
            required: MIN_GROUP_SIZE,
            actual: n,
        })
    }
}

fn power_curve(effect_size: f64, alpha: f64, tails: Tails, around: usize) -> Vec<PowerCurvePoint> {
    let upper = around.saturating_mul(2).max(CURVE_POINTS);
    let step = (upper / CURVE_POINTS).max(1);
    (MIN_GROUP_SIZE..=upper)
        .step_by(step)
        .map(|n| PowerCurvePoint {
            sample_size_per_group: n,
            power: power_at(effect_size, alpha, n as f64, tails),
        })
        .collect()
}

/// Solve the power relation for the unknown named by `spec.solve_for`
pub fn analyze_power(spec: &PowerSpec) -> Result<PowerResult> {
    let alpha = check_probability("alpha", spec.alpha)?;
    let tails = spec.tails;
    let mut warnings = Vec::new();

    let (effect_size, power, exact, n) = match spec.solve_for {
        SolveFor::SampleSize => {
            let d = check_effect(require(spec.effect_size, "effect_size", spec.solve_for)?)?;
            let target = check_probability("power", require(spec.power, "power", spec.solve_for)?)?;
            let exact = required_sample_size(d, alpha, target, tails);
            if !exact.is_finite() || exact > MAX_GROUP_SIZE as f64 {
                return Err(ImpactError::Validation(format!(
                    "effect_size {} would need more than {} observations per group",
                    d, MAX_GROUP_SIZE
                )));
            }
            let n = (exact.ceil() as usize).max(MIN_GROUP_SIZE);
            if n > 10_000 {
                warnings.push(format!(
                    "Detecting |d| = {:.3} requires {} observations per group",
                    d.abs(),
                    n
                ));
            }
            (d, power_at(d, alpha, n as f64, tails), exact, n)
        }
        SolveFor::Power => {
            let d = check_effect(require(spec.effect_size, "effect_size", spec.solve_for)?)?;
            let n = check_group_size(require(
                spec.sample_size_per_group,
                "sample_size_per_group",
                spec.solve_for,
            )?)?;
            (d, power_at(d, alpha, n as f64, tails), n as f64, n)
        }
        SolveFor::EffectSize => {
            let target = check_probability("power", require(spec.power, "power", spec.solve_for)?)?;
            let n = check_group_size(require(
                spec.sample_size_per_group,
                "sample_size_per_group",
                spec.solve_for,
            )?)?;
            let d = minimum_detectable_effect(alpha, target, n as f64, tails);
            (d, target, n as f64, n)
        }
    };

    let interpretation = PowerInterpretation::from_power(power);
    if interpretation == PowerInterpretation::Underpowered {
        warnings.push(format!(
            "Power {:.2} is below 0.6: a real effect of this size would often be missed",
            power
        ));
    }

    Ok(PowerResult {
        solve_for: spec.solve_for,
        effect_size,
        alpha,
        power,
        tails,
        exact_sample_size: exact,
        sample_size_per_group: n,
        total_sample_size: n.saturating_mul(2),
        interpretation,
        curve: power_curve(effect_size, alpha, tails, n),
        warnings,
    })
}
