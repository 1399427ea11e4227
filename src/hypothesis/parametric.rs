// Welch / Student t-tests and the variance-ratio F-test
//
// Scientific Foundation:
// - Welch, B. L. (1947). The generalization of "Student's" problem when
//   several different population variances are involved. Biometrika 34.
//   Satterthwaite degrees of freedom for unequal variances.
// - F-test p-values use the F(d1, d2) CDF from statrs.

use super::{TestDetail, TestKind, TestOutcome};
use crate::descriptive::{mean, pooled_variance, variance};
use crate::dist::{f_cdf, f_sf, t_two_sided_p};
use crate::effect_size::cohens_d;
use serde::{Deserialize, Serialize};

/// Variance-ratio test between the before and after windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceTest {
    /// Larger sample variance over the smaller one (>= 1)
    pub f_statistic: f64,
    pub df_numerator: f64,
    pub df_denominator: f64,
    /// Two-sided p-value
    pub p_value: f64,
    pub equal_variances: bool,
}

/// Two-sided F-test for equality of variances
pub fn f_test(before: &[f64], after: &[f64], alpha: f64) -> VarianceTest {
    let v1 = variance(before);
    let v2 = variance(after);
    let df1 = before.len().saturating_sub(1) as f64;
    let df2 = after.len().saturating_sub(1) as f64;

    let (larger, smaller, d_num, d_den) = if v1 >= v2 {
        (v1, v2, df1, df2)
    } else {
        (v2, v1, df2, df1)
    };

    if larger <= f64::EPSILON {
        // Both constant: variances are trivially equal
        return VarianceTest {
            f_statistic: 1.0,
            df_numerator: d_num,
            df_denominator: d_den,
            p_value: 1.0,
            equal_variances: true,
        };
    }
    if smaller <= f64::EPSILON {
        return VarianceTest {
            f_statistic: f64::INFINITY,
            df_numerator: d_num,
            df_denominator: d_den,
            p_value: 0.0,
            equal_variances: false,
        };
    }

    let f = larger / smaller;
    let upper = f_sf(f, d_num, d_den);
    let lower = f_cdf(f, d_num, d_den);
    let p_value = (2.0 * upper.min(lower)).min(1.0);

    VarianceTest {
        f_statistic: f,
        df_numerator: d_num,
        df_denominator: d_den,
        p_value,
        equal_variances: p_value >= alpha,
    }
}

fn zero_variance_outcome(kind: TestKind, detail: TestDetail, df: f64) -> TestOutcome {
    TestOutcome {
        kind,
        statistic: 0.0,
        degrees_of_freedom: Some(df),
        p_value: 1.0,
        effect_size: 0.0,
        detail,
        warnings: vec![
            "Zero variance in both windows: t statistic undefined, reporting no effect".to_string(),
        ],
    }
}

/// Welch's unequal-variance t-test with Satterthwaite degrees of freedom
pub fn welch_t(before: &[f64], after: &[f64]) -> TestOutcome {
    let n1 = before.len() as f64;
    let n2 = after.len() as f64;
    let a = variance(before) / n1;
    let b = variance(after) / n2;
    let standard_error = (a + b).sqrt();
    let mean_difference = mean(after) - mean(before);

    let denom = a * a / (n1 - 1.0) + b * b / (n2 - 1.0);
    let df = if denom > 0.0 {
        (a + b).powi(2) / denom
    } else {
        n1 + n2 - 2.0
    };

    let detail = TestDetail::WelchT {
        mean_difference,
        standard_error,
    };

    if standard_error <= f64::EPSILON {
        tracing::warn!("welch t-test on constant windows");
        return zero_variance_outcome(TestKind::WelchT, detail, df);
    }

    let t = mean_difference / standard_error;
    TestOutcome {
        kind: TestKind::WelchT,
        statistic: t,
        degrees_of_freedom: Some(df),
        p_value: t_two_sided_p(t, df),
        effect_size: cohens_d(before, after),
        detail,
        warnings: Vec::new(),
    }
}

/// Student's equal-variance t-test with pooled variance
pub fn student_t(before: &[f64], after: &[f64]) -> TestOutcome {
    let n1 = before.len() as f64;
    let n2 = after.len() as f64;
    let pooled = pooled_variance(before, after);
    let standard_error = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    let mean_difference = mean(after) - mean(before);
    let df = n1 + n2 - 2.0;

    let detail = TestDetail::StudentT {
        mean_difference,
        standard_error,
        pooled_variance: pooled,
    };

    if standard_error <= f64::EPSILON {
        tracing::warn!("student t-test on constant windows");
        return zero_variance_outcome(TestKind::StudentT, detail, df);
    }

    let t = mean_difference / standard_error;
    TestOutcome {
        kind: TestKind::StudentT,
        statistic: t,
        degrees_of_freedom: Some(df),
        p_value: t_two_sided_p(t, df),
        effect_size: cohens_d(before, after),
        detail,
        warnings: Vec::new(),
    }
}
