//! Multiple comparison correction across a family of p-values
//!
//! Bonferroni and Holm control the family-wise error rate, Benjamini-Hochberg
//! the false discovery rate. Every result is aligned to the caller's original
//! index order; sorting happens internally only.
//!
//! References:
//! - Holm, S. (1979). A simple sequentially rejective multiple test procedure.
//!   Scandinavian Journal of Statistics, 6(2), 65-70.
//! - Benjamini & Hochberg (1995). Controlling the false discovery rate.
//!   JRSS-B, 57(1), 289-300.

use crate::error::{ImpactError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relative slack when comparing a p-value to a computed threshold, so that
/// `0.04 <= (4/5)·0.05` holds despite rounding in the product.
const THRESHOLD_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    Bonferroni,
    Holm,
    BenjaminiHochberg,
}

impl CorrectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionMethod::Bonferroni => "bonferroni",
            CorrectionMethod::Holm => "holm",
            CorrectionMethod::BenjaminiHochberg => "benjamini_hochberg",
        }
    }

    /// Whether the method controls FDR rather than FWER
    pub fn controls_fdr(&self) -> bool {
        matches!(self, CorrectionMethod::BenjaminiHochberg)
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrectionMethod {
    type Err = ImpactError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "bonferroni" => Ok(CorrectionMethod::Bonferroni),
            "holm" | "holm_bonferroni" => Ok(CorrectionMethod::Holm),
            "bh" | "fdr" | "benjamini_hochberg" => Ok(CorrectionMethod::BenjaminiHochberg),
            _ => Err(ImpactError::unsupported("correction", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub method: CorrectionMethod,
    /// Input p-values, in caller order
    pub p_values: Vec<f64>,
    /// Family-wise α, or the target FDR for Benjamini-Hochberg
    pub alpha: f64,
    /// Per-test threshold the procedure effectively applied
    pub corrected_alpha: f64,
    /// Adjusted p-values, in caller order
    pub adjusted_p_values: Vec<f64>,
    /// Indices (caller order) of rejected hypotheses, ascending
    pub rejected: Vec<usize>,
    pub rejected_count: usize,
}

impl CorrectionResult {
    pub fn is_rejected(&self, index: usize) -> bool {
        self.rejected.binary_search(&index).is_ok()
    }
}

fn validate(p_values: &[f64], alpha: f64) -> Result<()> {
    if p_values.is_empty() {
        return Err(ImpactError::Validation(
            "p-value vector must not be empty".to_string(),
        ));
    }
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(ImpactError::Validation(format!(
            "alpha must be in (0, 1], got {}",
            alpha
        )));
    }
    if let Some((idx, p)) = p_values
        .iter()
        .enumerate()
        .find(|(_, p)| !(p.is_finite() && (0.0..=1.0).contains(*p)))
    {
        return Err(ImpactError::Validation(format!(
            "p-value at index {} must be in [0, 1], got {}",
            idx, p
        )));
    }
    Ok(())
}

fn at_most(p: f64, threshold: f64) -> bool {
    p <= threshold * (1.0 + THRESHOLD_TOLERANCE)
}

/// Indices sorted by ascending p-value (stable for equal values)
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));
    order
}

/// Correct a family of p-values
pub fn correct_for_multiple_comparisons(
    p_values: &[f64],
    method: CorrectionMethod,
    alpha: f64,
) -> Result<CorrectionResult> {
    validate(p_values, alpha)?;

    let (corrected_alpha, adjusted, mut rejected) = match method {
        CorrectionMethod::Bonferroni => bonferroni(p_values, alpha),
        CorrectionMethod::Holm => holm(p_values, alpha),
        CorrectionMethod::BenjaminiHochberg => benjamini_hochberg(p_values, alpha),
    };
    rejected.sort_unstable();

    tracing::debug!(
        method = %method,
        m = p_values.len(),
        rejected = rejected.len(),
        "multiple comparison correction"
    );

    Ok(CorrectionResult {
        method,
        p_values: p_values.to_vec(),
        alpha,
        corrected_alpha,
        adjusted_p_values: adjusted,
        rejected_count: rejected.len(),
        rejected,
    })
}

type Correction = (f64, Vec<f64>, Vec<usize>);

fn bonferroni(p_values: &[f64], alpha: f64) -> Correction {
    let m = p_values.len() as f64;
    let corrected_alpha = alpha / m;
    let adjusted = p_values.iter().map(|&p| (p * m).min(1.0)).collect();
    let rejected = p_values
        .iter()
        .enumerate()
        .filter(|(_, &p)| at_most(p, corrected_alpha))
        .map(|(i, _)| i)
        .collect();
    (corrected_alpha, adjusted, rejected)
}

/// Holm step-down: stop at the first non-rejection
fn holm(p_values: &[f64], alpha: f64) -> Correction {
    let m = p_values.len();
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; m];
    let mut running_max = 0.0f64;
    for (rank, &idx) in order.iter().enumerate() {
        let factor = (m - rank) as f64;
        running_max = running_max.max((p_values[idx] * factor).min(1.0));
        adjusted[idx] = running_max;
    }

    let mut rejected = Vec::new();
    for (rank, &idx) in order.iter().enumerate() {
        let threshold = alpha / (m - rank) as f64;
        if !at_most(p_values[idx], threshold) {
            break;
        }
        rejected.push(idx);
    }

    (alpha / m as f64, adjusted, rejected)
}

/// Benjamini-Hochberg step-up: reject every rank up to the largest passing one
fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> Correction {
    let m = p_values.len();
    let mf = m as f64;
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; m];
    let mut running_min = f64::INFINITY;
    for (rank0, &idx) in order.iter().enumerate().rev() {
        let rank = (rank0 + 1) as f64;
        running_min = running_min.min((p_values[idx] * mf / rank).min(1.0));
        adjusted[idx] = running_min;
    }

    let largest_passing = order
        .iter()
        .enumerate()
        .filter(|(rank0, &idx)| at_most(p_values[idx], (*rank0 + 1) as f64 / mf * alpha))
        .map(|(rank0, _)| rank0 + 1)
        .max()
        .unwrap_or(0);

    let rejected = order[..largest_passing].to_vec();
    let corrected_alpha = if largest_passing > 0 {
        largest_passing as f64 / mf * alpha
    } else {
        alpha / mf
    };
    (corrected_alpha, adjusted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAMILY: [f64; 5] = [0.001, 0.02, 0.03, 0.04, 0.20];

    #[test]
    fn test_bonferroni_rejects_only_strongest() {
        let result =
            correct_for_multiple_comparisons(&FAMILY, CorrectionMethod::Bonferroni, 0.05).unwrap();
        assert_eq!(result.rejected, vec![0]);
        assert_eq!(result.rejected_count, 1);
        assert!((result.corrected_alpha - 0.01).abs() < 1e-15);
        assert!((result.adjusted_p_values[1] - 0.1).abs() < 1e-12);
        assert_eq!(result.adjusted_p_values[4], 1.0);
    }

    #[test]
    fn test_benjamini_hochberg_step_up() {
        let result =
            correct_for_multiple_comparisons(&FAMILY, CorrectionMethod::BenjaminiHochberg, 0.05)
                .unwrap();
        // 0.04 <= (4/5)·0.05 at rank 4, so the step-up rejects ranks 1..=4
        for idx in [0, 1, 2, 3] {
            assert!(result.is_rejected(idx), "index {} should be rejected", idx);
        }
        assert!(!result.is_rejected(4));
        assert_eq!(result.rejected_count, 4);
        assert!((result.corrected_alpha - 0.04).abs() < 1e-12);
        assert!((result.adjusted_p_values[0] - 0.005).abs() < 1e-12);
        assert!((result.adjusted_p_values[1] - 0.05).abs() < 1e-12);
        assert!((result.adjusted_p_values[4] - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_holm_stops_at_first_failure() {
        let result =
            correct_for_multiple_comparisons(&FAMILY, CorrectionMethod::Holm, 0.05).unwrap();
        // 0.02 > 0.05/4 stops the procedure even though later values are small
        assert_eq!(result.rejected, vec![0]);
        let expected = [0.005, 0.08, 0.09, 0.09, 0.20];
        for (got, want) in result.adjusted_p_values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_results_follow_caller_order() {
        let shuffled = [0.20, 0.03, 0.001, 0.04, 0.02];
        let result =
            correct_for_multiple_comparisons(&shuffled, CorrectionMethod::BenjaminiHochberg, 0.05)
                .unwrap();
        assert!(result.is_rejected(2));
        assert!(result.is_rejected(4));
        assert!(result.is_rejected(1));
        assert!(!result.is_rejected(0));
        assert_eq!(result.p_values, shuffled.to_vec());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            correct_for_multiple_comparisons(&[], CorrectionMethod::Holm, 0.05),
            Err(ImpactError::Validation(_))
        ));
        assert!(correct_for_multiple_comparisons(&[0.1, 1.2], CorrectionMethod::Holm, 0.05).is_err());
        assert!(correct_for_multiple_comparisons(&[0.1], CorrectionMethod::Holm, 0.0).is_err());
        assert!(
            correct_for_multiple_comparisons(&[f64::NAN], CorrectionMethod::Bonferroni, 0.05)
                .is_err()
        );
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "fdr".parse::<CorrectionMethod>().unwrap(),
            CorrectionMethod::BenjaminiHochberg
        );
        assert_eq!("Holm".parse::<CorrectionMethod>().unwrap(), CorrectionMethod::Holm);
        let err = "sidak".parse::<CorrectionMethod>().unwrap_err();
        assert!(matches!(err, ImpactError::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_nothing_rejected() {
        let result = correct_for_multiple_comparisons(
            &[0.5, 0.6, 0.9],
            CorrectionMethod::BenjaminiHochberg,
            0.05,
        )
        .unwrap();
        assert!(result.rejected.is_empty());
        assert!((result.corrected_alpha - 0.05 / 3.0).abs() < 1e-15);
    }
}
