// Pre/post correlation between fields
//
// Each field is reduced to daily means, aligned with its partner on shared
// days, and differenced between consecutive shared days on the same side of
// the anchor. Correlating the differences rather than the levels keeps two
// fields that merely both shift at the event from looking related.

use super::{align, daily_means};
use crate::descriptive::{rank_with_ties, std_dev};
use crate::dist::{clamp_probability, normal_sf, t_two_sided_p};
use crate::error::{ImpactError, Result};
use crate::window::TimedValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Absolute change in |r| separating a real strengthening/weakening from noise
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 0.2;

/// Minimum paired differences for a coefficient
const MIN_PAIRS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Kendall => "kendall",
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationMethod {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" | "kendall_tau" => Ok(CorrelationMethod::Kendall),
            _ => Err(ImpactError::unsupported("correlation", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub method: CorrelationMethod,
    pub coefficient: f64,
    pub p_value: f64,
    pub n: usize,
}

impl Correlation {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationChange {
    Strengthened,
    Weakened,
    Negligible,
}

impl CorrelationChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationChange::Strengthened => "strengthened",
            CorrelationChange::Weakened => "weakened",
            CorrelationChange::Negligible => "negligible",
        }
    }

    /// Compare |post| against |pre|
    pub fn classify(pre: f64, post: f64, threshold: f64) -> Self {
        let delta = post.abs() - pre.abs();
        if delta > threshold {
            CorrelationChange::Strengthened
        } else if delta < -threshold {
            CorrelationChange::Weakened
        } else {
            CorrelationChange::Negligible
        }
    }
}

/// Pearson product-moment correlation; 0 when either side is constant
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (sx, sy) = (std_dev(x), std_dev(y));
    if sx <= 0.0 || sy <= 0.0 {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let cov = x
        .iter()
        .zip(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (n - 1) as f64;
    (cov / (sx * sy)).clamp(-1.0, 1.0)
}

/// Pearson correlation of tie-averaged ranks
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    pearson(&rank_with_ties(&x[..n]), &rank_with_ties(&y[..n]))
}

/// Kendall's tau-b, adjusted for ties in either variable
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut tied_x = 0i64;
    let mut tied_y = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 {
                tied_x += 1;
            }
            if dy == 0.0 {
                tied_y += 1;
            }
            if dx == 0.0 || dy == 0.0 {
                continue;
            }
            if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }
    let pairs = (n * n.saturating_sub(1) / 2) as i64;
    let denom = (((pairs - tied_x) * (pairs - tied_y)) as f64).sqrt();
    if denom <= 0.0 {
        0.0
    } else {
        (concordant - discordant) as f64 / denom
    }
}

/// Coefficient with significance; `None` below three pairs
pub fn correlate(x: &[f64], y: &[f64], method: CorrelationMethod) -> Option<Correlation> {
    let n = x.len().min(y.len());
    if n < MIN_PAIRS {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let coefficient = match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
        CorrelationMethod::Kendall => kendall_tau_b(x, y),
    };

    let nf = n as f64;
    let p_value = match method {
        CorrelationMethod::Pearson | CorrelationMethod::Spearman => {
            let df = nf - 2.0;
            let residual = (1.0 - coefficient * coefficient).max(0.0);
            let t = if residual == 0.0 {
                f64::INFINITY
            } else {
                coefficient * (df / residual).sqrt()
            };
            if coefficient == 0.0 {
                1.0
            } else {
                t_two_sided_p(t, df)
            }
        }
        CorrelationMethod::Kendall => {
            let var = 2.0 * (2.0 * nf + 5.0) / (9.0 * nf * (nf - 1.0));
            clamp_probability(2.0 * normal_sf(coefficient.abs() / var.sqrt()))
        }
    };

    Some(Correlation {
        method,
        coefficient,
        p_value,
        n,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPairCorrelation {
    pub field_a: String,
    pub field_b: String,
    pub pre_event: Option<Correlation>,
    pub post_event: Option<Correlation>,
    /// Present only when both periods have a coefficient
    pub change: Option<CorrelationChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub fields: Vec<String>,
    pub change_threshold: f64,
    /// Upper triangle, in field order
    pub pairs: Vec<FieldPairCorrelation>,
}

impl CorrelationMatrix {
    /// Pair lookup in either order
    pub fn get(&self, a: &str, b: &str) -> Option<&FieldPairCorrelation> {
        self.pairs.iter().find(|p| {
            (p.field_a == a && p.field_b == b) || (p.field_a == b && p.field_b == a)
        })
    }

    fn coefficients(&self, post: bool) -> Vec<Vec<Option<f64>>> {
        let n = self.fields.len();
        let mut out = vec![vec![None; n]; n];
        for (i, row) in out.iter_mut().enumerate() {
            row[i] = Some(1.0);
        }
        for pair in &self.pairs {
            let (Some(i), Some(j)) = (
                self.fields.iter().position(|f| *f == pair.field_a),
                self.fields.iter().position(|f| *f == pair.field_b),
            ) else {
                continue;
            };
            let side = if post { pair.post_event } else { pair.pre_event };
            let value = side.map(|c| c.coefficient);
            out[i][j] = value;
            out[j][i] = value;
        }
        out
    }

    pub fn pre_event_matrix(&self) -> Vec<Vec<Option<f64>>> {
        self.coefficients(false)
    }

    pub fn post_event_matrix(&self) -> Vec<Vec<Option<f64>>> {
        self.coefficients(true)
    }

    pub fn changed_pairs(&self) -> impl Iterator<Item = &FieldPairCorrelation> {
        self.pairs
            .iter()
            .filter(|p| matches!(p.change, Some(c) if c != CorrelationChange::Negligible))
    }
}

/// Consecutive differences of aligned rows, split at the anchor
fn paired_differences(rows: &[(i64, f64, f64)]) -> [(Vec<f64>, Vec<f64>); 2] {
    let mut pre = (Vec::new(), Vec::new());
    let mut post = (Vec::new(), Vec::new());
    for pair in rows.windows(2) {
        let (d0, a0, b0) = pair[0];
        let (d1, a1, b1) = pair[1];
        // Differences never straddle the anchor
        let side = match (d0 < 0, d1 < 0) {
            (true, true) => &mut pre,
            (false, false) => &mut post,
            _ => continue,
        };
        side.0.push(a1 - a0);
        side.1.push(b1 - b0);
    }
    [pre, post]
}

/// Correlation of every field pair before and after the anchor
pub fn correlation_matrix(
    series_by_field: &BTreeMap<String, Vec<TimedValue>>,
    anchor: DateTime<Utc>,
    method: CorrelationMethod,
    change_threshold: f64,
) -> Result<CorrelationMatrix> {
    if series_by_field.len() < 2 {
        return Err(ImpactError::Validation(format!(
            "correlation needs at least two fields, got {}",
            series_by_field.len()
        )));
    }
    if !(0.0..=1.0).contains(&change_threshold) {
        return Err(ImpactError::Validation(format!(
            "change threshold must be within [0, 1], got {}",
            change_threshold
        )));
    }

    let daily: Vec<(&String, BTreeMap<i64, f64>)> = series_by_field
        .iter()
        .map(|(field, series)| (field, daily_means(series, anchor)))
        .collect();

    let mut pairs = Vec::new();
    for (i, (field_a, a)) in daily.iter().enumerate() {
        for (field_b, b) in daily.iter().skip(i + 1) {
            let rows = align(a, b);
            let [pre, post] = paired_differences(&rows);
            let pre_event = correlate(&pre.0, &pre.1, method);
            let post_event = correlate(&post.0, &post.1, method);
            let change = match (pre_event, post_event) {
                (Some(before), Some(after)) => Some(CorrelationChange::classify(
                    before.coefficient,
                    after.coefficient,
                    change_threshold,
                )),
                _ => None,
            };
            pairs.push(FieldPairCorrelation {
                field_a: (*field_a).clone(),
                field_b: (*field_b).clone(),
                pre_event,
                post_event,
                change,
            });
        }
    }

    Ok(CorrelationMatrix {
        method,
        fields: series_by_field.keys().cloned().collect(),
        change_threshold,
        pairs,
    })
}
