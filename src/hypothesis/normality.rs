// Jarque-Bera normality check
//
// JB = n/6 · (S² + K²/4), asymptotically χ²(2) under normality, so the
// p-value is exactly exp(-JB/2).

use super::TestKind;
use crate::descriptive::{excess_kurtosis, skewness};
use serde::{Deserialize, Serialize};

/// Below this size the statistic has no power; the check passes vacuously
const MIN_NORMALITY_SAMPLE: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityCheck {
    pub n: usize,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub statistic: f64,
    pub p_value: f64,
    pub is_normal: bool,
}

/// Jarque-Bera test on one sample
pub fn jarque_bera(data: &[f64], alpha: f64) -> NormalityCheck {
    let n = data.len();
    if n < MIN_NORMALITY_SAMPLE {
        return NormalityCheck {
            n,
            skewness: 0.0,
            excess_kurtosis: 0.0,
            statistic: 0.0,
            p_value: 1.0,
            is_normal: true,
        };
    }

    let s = skewness(data);
    let k = excess_kurtosis(data);
    let statistic = n as f64 / 6.0 * (s * s + k * k / 4.0);
    let p_value = (-statistic / 2.0).exp().clamp(0.0, 1.0);

    NormalityCheck {
        n,
        skewness: s,
        excess_kurtosis: k,
        statistic,
        p_value,
        is_normal: p_value >= alpha,
    }
}

/// Normality of both windows with a test recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityAssessment {
    pub before: NormalityCheck,
    pub after: NormalityCheck,
    pub assumptions_met: bool,
    /// Set when a rank-based test should replace the t-test
    pub recommended_test: Option<TestKind>,
}

impl NormalityAssessment {
    pub fn of(before: &[f64], after: &[f64], alpha: f64) -> Self {
        let before = jarque_bera(before, alpha);
        let after = jarque_bera(after, alpha);
        let assumptions_met = before.is_normal && after.is_normal;
        Self {
            before,
            after,
            assumptions_met,
            recommended_test: (!assumptions_met).then_some(TestKind::MannWhitneyU),
        }
    }
}
