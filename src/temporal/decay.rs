// Decay weighting by distance from the event anchor
//
// weight(d) = min_weight + (max_weight - min_weight) · f(|d| / half_life)
//
// Shapes (x = |d| / half_life):
// - exponential: 0.5^x
// - linear:      max(0, 1 - x/2), reaching zero at two half-lives
// - gaussian:    exp(-ln2 · x²)
// - polynomial:  1 / (1 + x²)
// - step:        1 while x <= 1, else 0
//
// Every shape is 1 at the anchor and 0.5 at one half-life (step excepted),
// so weight(0) == max_weight and weights stay within [min_weight, max_weight].

use crate::descriptive::{effective_sample_size, weighted_mean};
use crate::error::ImpactError;
use crate::window::{days_from, TimedValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::f64::consts::LN_2;
use std::str::FromStr;

/// Strategy mapping distance from the anchor (days) to a weight
pub trait DecayStrategy {
    fn weight(&self, days_from_event: f64) -> f64;

    fn name(&self) -> &'static str;

    fn weights_for(&self, points: &[TimedValue], anchor: DateTime<Utc>) -> Vec<f64> {
        points
            .iter()
            .map(|p| self.weight(days_from(anchor, p.timestamp)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayType {
    Exponential,
    Linear,
    Polynomial,
    Gaussian,
    Step,
}

impl DecayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayType::Exponential => "exponential",
            DecayType::Linear => "linear",
            DecayType::Polynomial => "polynomial",
            DecayType::Gaussian => "gaussian",
            DecayType::Step => "step",
        }
    }

    /// Unit shape f(x) for x = |d| / half_life, in [0, 1]
    fn shape(&self, x: f64) -> f64 {
        match self {
            DecayType::Exponential => 0.5f64.powf(x),
            DecayType::Linear => (1.0 - x / 2.0).max(0.0),
            DecayType::Polynomial => 1.0 / (1.0 + x * x),
            DecayType::Gaussian => (-LN_2 * x * x).exp(),
            DecayType::Step => {
                if x <= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for DecayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecayType {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exponential" | "exp" => Ok(DecayType::Exponential),
            "linear" => Ok(DecayType::Linear),
            "polynomial" | "power" => Ok(DecayType::Polynomial),
            "gaussian" | "normal" => Ok(DecayType::Gaussian),
            "step" => Ok(DecayType::Step),
            _ => Err(ImpactError::unsupported("decay", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayFunction {
    pub decay_type: DecayType,
    pub half_life_days: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for DecayFunction {
    fn default() -> Self {
        Self {
            decay_type: DecayType::Exponential,
            half_life_days: 7.0,
            min_weight: 0.0,
            max_weight: 1.0,
        }
    }
}

impl DecayFunction {
    pub fn new(decay_type: DecayType, half_life_days: f64) -> Self {
        Self {
            decay_type,
            half_life_days,
            ..Self::default()
        }
    }

    pub fn with_bounds(mut self, min_weight: f64, max_weight: f64) -> Self {
        self.min_weight = min_weight;
        self.max_weight = max_weight;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return Err(format!(
                "half_life_days must be positive, got {}",
                self.half_life_days
            ));
        }
        if !(self.min_weight >= 0.0 && self.min_weight <= self.max_weight) {
            return Err(format!(
                "weights must satisfy 0 <= min_weight <= max_weight, got [{}, {}]",
                self.min_weight, self.max_weight
            ));
        }
        if self.max_weight <= 0.0 {
            return Err("max_weight must be positive".to_string());
        }
        Ok(())
    }
}

impl DecayStrategy for DecayFunction {
    fn weight(&self, days_from_event: f64) -> f64 {
        let x = days_from_event.abs() / self.half_life_days;
        let w = self.min_weight + (self.max_weight - self.min_weight) * self.decay_type.shape(x);
        w.clamp(self.min_weight, self.max_weight)
    }

    fn name(&self) -> &'static str {
        self.decay_type.as_str()
    }
}

/// Weighted means and effective sizes of one before/after split
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WeightedSplit {
    pub before_mean: f64,
    pub after_mean: f64,
    pub before_ess: f64,
    pub after_ess: f64,
    /// Squared standard error of the weighted impact
    pub impact_variance: f64,
}

fn weighted_variance(values: &[f64], weights: &[f64], centre: f64) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - centre) * (v - centre))
        .sum::<f64>()
        / total
}

/// Apply a decay strategy with per-point confidence multipliers
pub(crate) fn weighted_split<S: DecayStrategy + ?Sized>(
    strategy: &S,
    anchor: DateTime<Utc>,
    before: &[(TimedValue, f64)],
    after: &[(TimedValue, f64)],
) -> WeightedSplit {
    let side = |points: &[(TimedValue, f64)]| {
        let values: Vec<f64> = points.iter().map(|(p, _)| p.value).collect();
        let weights: Vec<f64> = points
            .iter()
            .map(|(p, confidence)| strategy.weight(days_from(anchor, p.timestamp)) * confidence)
            .collect();
        let m = weighted_mean(&values, &weights);
        let ess = effective_sample_size(&weights);
        let var = weighted_variance(&values, &weights, m);
        (m, ess, if ess > 0.0 { var / ess } else { f64::INFINITY })
    };
    let (before_mean, before_ess, v1) = side(before);
    let (after_mean, after_ess, v2) = side(after);
    WeightedSplit {
        before_mean,
        after_mean,
        before_ess,
        after_ess,
        impact_variance: v1 + v2,
    }
}

/// Picks the half-life whose weighting gives the most precise impact
/// estimate (smallest weighted residual variance of the impact)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveDecay {
    pub decay_type: DecayType,
    pub candidate_half_lives: Vec<f64>,
}

impl Default for AdaptiveDecay {
    fn default() -> Self {
        Self {
            decay_type: DecayType::Exponential,
            candidate_half_lives: vec![1.0, 3.0, 7.0, 14.0, 30.0],
        }
    }
}

impl AdaptiveDecay {
    pub fn select(
        &self,
        template: &DecayFunction,
        anchor: DateTime<Utc>,
        before: &[(TimedValue, f64)],
        after: &[(TimedValue, f64)],
    ) -> DecayFunction {
        let mut best = *template;
        let mut best_score = f64::INFINITY;
        for &half_life in &self.candidate_half_lives {
            if !(half_life.is_finite() && half_life > 0.0) {
                continue;
            }
            let candidate = DecayFunction {
                decay_type: self.decay_type,
                half_life_days: half_life,
                ..*template
            };
            let score = weighted_split(&candidate, anchor, before, after).impact_variance;
            if score < best_score {
                best_score = score;
                best = candidate;
            }
        }
        tracing::debug!(
            half_life = best.half_life_days,
            decay = %best.decay_type,
            "adaptive decay selected"
        );
        best
    }
}
