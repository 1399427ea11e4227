// Action recommendation derived from a finished report

use super::{CrossFieldAnalysis, FieldAnalysis, ReportStatus};
use crate::effect_size::Magnitude;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Power below which a null result is treated as inconclusive
const ADEQUATE_POWER: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Significant shift of at least medium size
    Act,
    /// Significant but small shift
    Monitor,
    /// Inconclusive: too little data or power
    CollectMoreData,
    /// Adequately powered null result
    NoAction,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Act => "act",
            RecommendedAction::Monitor => "monitor",
            RecommendedAction::CollectMoreData => "collect_more_data",
            RecommendedAction::NoAction => "no_action",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: RecommendedAction,
    /// Field the headline is about
    pub primary_field: Option<String>,
    pub headline: String,
    pub details: Vec<String>,
}

fn effect_magnitude(field: &FieldAnalysis) -> Magnitude {
    field
        .effect_sizes
        .as_ref()
        .map(|e| e.cohens_d.magnitude)
        .unwrap_or_else(|| Magnitude::from_value(field.test.effect_size))
}

fn adjusted_p(field: &FieldAnalysis) -> f64 {
    field.adjusted_p_value.unwrap_or(field.test.p_value)
}

pub(crate) fn recommend(
    fields: &[FieldAnalysis],
    cross_field: Option<&CrossFieldAnalysis>,
    status: ReportStatus,
) -> Recommendation {
    let primary = fields
        .iter()
        .filter(|f| f.testable)
        .min_by(|a, b| adjusted_p(a).total_cmp(&adjusted_p(b)));

    let Some(primary) = primary else {
        return Recommendation {
            action: RecommendedAction::CollectMoreData,
            primary_field: None,
            headline: "No field has enough observations on both sides of the event".to_string(),
            details: Vec::new(),
        };
    };

    let magnitude = effect_magnitude(primary);
    let direction = primary.test.direction.as_str();
    let (action, headline) = if primary.significant_after_correction {
        let action = if magnitude.is_at_least(Magnitude::Medium) {
            RecommendedAction::Act
        } else {
            RecommendedAction::Monitor
        };
        (
            action,
            format!(
                "'{}' shows a significant {} {} (adjusted p = {:.4})",
                primary.field,
                magnitude.as_str(),
                direction,
                adjusted_p(primary)
            ),
        )
    } else {
        match primary.power.as_ref().map(|p| p.power) {
            Some(power) if power < ADEQUATE_POWER => (
                RecommendedAction::CollectMoreData,
                format!(
                    "'{}' shows no significant change, but power is only {:.0}%",
                    primary.field,
                    power * 100.0
                ),
            ),
            _ => (
                RecommendedAction::NoAction,
                format!("No significant change detected in '{}'", primary.field),
            ),
        }
    };

    let mut details = Vec::new();
    if let Some(persistence) = primary.temporal.as_ref().and_then(|t| t.persistence()) {
        match persistence.half_life_days {
            Some(days) => details.push(format!("Impact half-life is about {:.1} days", days)),
            None => details.push("Impact shows no decay over the observed window".to_string()),
        }
    }
    let others: Vec<&str> = fields
        .iter()
        .filter(|f| f.significant_after_correction && f.field != primary.field)
        .map(|f| f.field.as_str())
        .collect();
    if !others.is_empty() {
        details.push(format!("Also significant: {}", others.join(", ")));
    }
    if let Some(cross) = cross_field {
        if let Some(network) = &cross.network {
            if network.has_cycles() {
                details.push(format!(
                    "{} feedback loop(s) between fields; attribute impact with care",
                    network.cycles.len()
                ));
            }
            if let Some(driver) = &network.strongest_driver {
                details.push(format!("'{}' is the strongest leading field", driver));
            }
        }
        if let Some(composite) = &cross.composite {
            if let (Some(field), Some(index)) = (&composite.dominant_field, composite.dominance_index)
            {
                if index >= 2.0 {
                    details.push(format!(
                        "'{}' dominates the composite impact ({:.1}x the next field)",
                        field, index
                    ));
                }
            }
        }
    }
    if status == ReportStatus::Partial {
        details.push("Some components failed; see warnings".to_string());
    }

    Recommendation {
        action,
        primary_field: Some(primary.field.clone()),
        headline,
        details,
    }
}
