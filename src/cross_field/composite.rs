// Composite impact across fields
//
// Each field contributes weight × impact. The composite combines those
// contributions per the aggregation method; geometric and harmonic means
// work on magnitudes and carry the sign of the summed contributions.

use crate::error::{ImpactError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Sum,
    WeightedMean,
    GeometricMean,
    HarmonicMean,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Sum => "sum",
            AggregationMethod::WeightedMean => "weighted_mean",
            AggregationMethod::GeometricMean => "geometric_mean",
            AggregationMethod::HarmonicMean => "harmonic_mean",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "sum" => Ok(AggregationMethod::Sum),
            "weighted_mean" | "mean" => Ok(AggregationMethod::WeightedMean),
            "geometric_mean" | "geometric" => Ok(AggregationMethod::GeometricMean),
            "harmonic_mean" | "harmonic" => Ok(AggregationMethod::HarmonicMean),
            _ => Err(ImpactError::unsupported("aggregation", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldImpact {
    pub field: String,
    pub impact: f64,
    pub weight: f64,
}

impl FieldImpact {
    pub fn new(field: impl Into<String>, impact: f64, weight: f64) -> Self {
        Self {
            field: field.into(),
            impact,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldContribution {
    pub field: String,
    pub weighted_impact: f64,
    /// |weighted impact| over the sum of all |weighted impacts|
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeImpact {
    pub method: AggregationMethod,
    pub value: f64,
    pub contributions: Vec<FieldContribution>,
    pub dominant_field: Option<String>,
    /// Largest over second-largest |weighted impact|; absent when the
    /// runner-up contributes nothing
    pub dominance_index: Option<f64>,
    pub warnings: Vec<String>,
}

pub fn composite_impact(impacts: &[FieldImpact], method: AggregationMethod) -> Result<CompositeImpact> {
    if impacts.is_empty() {
        return Err(ImpactError::Validation(
            "composite impact needs at least one field".to_string(),
        ));
    }
    if let Some(bad) = impacts
        .iter()
        .find(|f| !(f.weight.is_finite() && f.weight >= 0.0 && f.impact.is_finite()))
    {
        return Err(ImpactError::Validation(format!(
            "field '{}' has weight {} and impact {}; weights must be non-negative and values finite",
            bad.field, bad.weight, bad.impact
        )));
    }
    let total_weight: f64 = impacts.iter().map(|f| f.weight).sum();
    if total_weight <= 0.0 {
        return Err(ImpactError::Validation(
            "composite weights sum to zero".to_string(),
        ));
    }

    let mut warnings = Vec::new();
    let weighted: Vec<f64> = impacts.iter().map(|f| f.weight * f.impact).collect();
    let sum: f64 = weighted.iter().sum();
    let sign = if sum < 0.0 { -1.0 } else { 1.0 };
    let has_zero = impacts.iter().any(|f| f.weight > 0.0 && f.impact == 0.0);

    let value = match method {
        AggregationMethod::Sum => sum,
        AggregationMethod::WeightedMean => sum / total_weight,
        AggregationMethod::GeometricMean | AggregationMethod::HarmonicMean if has_zero => {
            warnings.push(format!(
                "A zero impact collapses the {} to zero",
                method.as_str().replace('_', " ")
            ));
            0.0
        }
        AggregationMethod::GeometricMean => {
            let log_mean = impacts
                .iter()
                .filter(|f| f.weight > 0.0)
                .map(|f| f.weight * f.impact.abs().ln())
                .sum::<f64>()
                / total_weight;
            sign * log_mean.exp()
        }
        AggregationMethod::HarmonicMean => {
            let reciprocal: f64 = impacts
                .iter()
                .filter(|f| f.weight > 0.0)
                .map(|f| f.weight / f.impact.abs())
                .sum();
            sign * total_weight / reciprocal
        }
    };
    if matches!(
        method,
        AggregationMethod::GeometricMean | AggregationMethod::HarmonicMean
    ) && weighted.iter().any(|w| w * sign < 0.0)
    {
        warnings.push("Field impacts disagree in sign; mean uses magnitudes".to_string());
    }

    let total_magnitude: f64 = weighted.iter().map(|w| w.abs()).sum();
    let contributions: Vec<FieldContribution> = impacts
        .iter()
        .zip(&weighted)
        .map(|(f, &w)| FieldContribution {
            field: f.field.clone(),
            weighted_impact: w,
            share: if total_magnitude > 0.0 {
                w.abs() / total_magnitude
            } else {
                0.0
            },
        })
        .collect();

    let mut ranked: Vec<(usize, f64)> = weighted.iter().map(|w| w.abs()).enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let dominant_field = ranked
        .first()
        .filter(|(_, magnitude)| *magnitude > 0.0)
        .map(|(i, _)| impacts[*i].field.clone());
    let dominance_index = match (ranked.first(), ranked.get(1)) {
        (Some(&(_, top)), Some(&(_, second))) if second > 0.0 => Some(top / second),
        _ => None,
    };

    Ok(CompositeImpact {
        method,
        value,
        contributions,
        dominant_field,
        dominance_index,
        warnings,
    })
}
