// Two-sample hypothesis tests for before/after windows
//
// Every test takes the before sample first and the after sample second and
// orients statistics as `after - before`. `run_test` never fails: undersized
// samples, zero variance and cancelled resampling all degrade into a
// non-significant `TestResult` that carries warnings explaining why.
//
// Test selection:
// - `WelchT` with no explicit variance assumption runs an F-test first and
//   switches to Student's t when the variances look equal
// - `StudentT` assumes equal variances unless told otherwise
// - `MannWhitneyU` uses the tie-corrected normal approximation
// - `Exact` enumerates the rank-sum distribution for small samples
// - `Permutation` shuffles group labels with the injected resampler

mod nonparametric;
mod normality;
mod parametric;

pub use nonparametric::{exact_rank_test, mann_whitney, permutation_test, EXACT_TOTAL_LIMIT};
pub use normality::{jarque_bera, NormalityAssessment, NormalityCheck};
pub use parametric::{f_test, student_t, welch_t, VarianceTest};

use crate::descriptive::mean;
use crate::effect_size::Direction;
use crate::error::ImpactError;
use crate::sampling::Resampler;
use crate::window::{MIN_RELIABLE_SAMPLE, MIN_TEST_SAMPLE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of two-sample test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    WelchT,
    StudentT,
    MannWhitneyU,
    Permutation,
    Exact,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::WelchT => "welch_t",
            TestKind::StudentT => "student_t",
            TestKind::MannWhitneyU => "mann_whitney_u",
            TestKind::Permutation => "permutation",
            TestKind::Exact => "exact",
        }
    }

    pub fn is_parametric(&self) -> bool {
        matches!(self, TestKind::WelchT | TestKind::StudentT)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "welch" | "welch_t" | "t" | "ttest" | "t_test" => Ok(TestKind::WelchT),
            "student" | "student_t" => Ok(TestKind::StudentT),
            "mann_whitney" | "mann_whitney_u" | "mwu" | "wilcoxon" => Ok(TestKind::MannWhitneyU),
            "permutation" | "perm" => Ok(TestKind::Permutation),
            "exact" => Ok(TestKind::Exact),
            _ => Err(ImpactError::unsupported("test", s)),
        }
    }
}

/// Options shared by every test kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOptions {
    /// Explicit variance assumption; `None` lets the F-test decide
    pub assume_equal_variance: Option<bool>,
    pub confidence_level: f64,
    /// Run the normality check and recommend a rank test when it fails
    pub validate_assumptions: bool,
    pub permutation_iterations: usize,
    /// Below this per-side size results carry a low-confidence warning
    pub min_reliable_sample: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            assume_equal_variance: None,
            confidence_level: 0.95,
            validate_assumptions: false,
            permutation_iterations: 10_000,
            min_reliable_sample: MIN_RELIABLE_SAMPLE,
        }
    }
}

impl TestOptions {
    /// Significance level α = 1 - confidence
    pub fn alpha(&self) -> f64 {
        1.0 - self.confidence_level
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            ));
        }
        if self.permutation_iterations == 0 {
            return Err("permutation_iterations must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Kind-specific details of a computed test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestDetail {
    WelchT {
        mean_difference: f64,
        standard_error: f64,
    },
    StudentT {
        mean_difference: f64,
        standard_error: f64,
        pooled_variance: f64,
    },
    MannWhitneyU {
        u_before: f64,
        u_after: f64,
        z: f64,
        ties_present: bool,
    },
    Permutation {
        observed_difference: f64,
        iterations: usize,
        extreme_count: usize,
    },
    Exact {
        u_before: f64,
        u_after: f64,
        /// False when the sample was too large and the normal approximation was used
        enumerated: bool,
        arrangements: f64,
    },
}

/// Optional diagnostic sub-results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub variance: Option<VarianceTest>,
    pub normality: Option<NormalityAssessment>,
}

/// Result of one two-sample test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test that was actually computed
    pub kind: TestKind,
    pub requested_kind: TestKind,
    pub statistic: f64,
    pub degrees_of_freedom: Option<f64>,
    pub p_value: f64,
    /// Cohen's d for mean-based tests, rank-biserial for rank tests
    pub effect_size: f64,
    pub is_significant: bool,
    pub alpha: f64,
    pub n_before: usize,
    pub n_after: usize,
    pub mean_before: f64,
    pub mean_after: f64,
    pub direction: Direction,
    pub detail: Option<TestDetail>,
    pub diagnostics: Diagnostics,
    pub warnings: Vec<String>,
    /// True when the result is the degraded placeholder
    pub degraded: bool,
}

impl TestResult {
    /// Non-significant placeholder returned when a test cannot run
    pub fn degraded(
        before: &[f64],
        after: &[f64],
        kind: TestKind,
        alpha: f64,
        warnings: Vec<String>,
    ) -> Self {
        let mean_before = mean(before);
        let mean_after = mean(after);
        Self {
            kind,
            requested_kind: kind,
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
            effect_size: 0.0,
            is_significant: false,
            alpha,
            n_before: before.len(),
            n_after: after.len(),
            mean_before,
            mean_after,
            direction: Direction::from_difference(mean_after - mean_before),
            detail: None,
            diagnostics: Diagnostics::default(),
            warnings,
            degraded: true,
        }
    }

    pub fn mean_difference(&self) -> f64 {
        self.mean_after - self.mean_before
    }
}

/// Raw output of a single test implementation
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub kind: TestKind,
    pub statistic: f64,
    pub degrees_of_freedom: Option<f64>,
    pub p_value: f64,
    pub effect_size: f64,
    pub detail: TestDetail,
    pub warnings: Vec<String>,
}

/// Run one test on a before/after pair
///
/// Never fails; see the module comment for the degradation policy.
pub fn run_test(
    before: &[f64],
    after: &[f64],
    kind: TestKind,
    options: &TestOptions,
    resampler: &mut Resampler,
) -> TestResult {
    let alpha = options.alpha();

    if let Err(msg) = options.validate() {
        tracing::warn!(%kind, "invalid test options: {}", msg);
        return TestResult::degraded(
            before,
            after,
            kind,
            alpha.clamp(0.0, 1.0),
            vec![format!("Invalid test options: {}", msg)],
        );
    }

    if before.len() < MIN_TEST_SAMPLE || after.len() < MIN_TEST_SAMPLE {
        let msg = format!(
            "Insufficient data for {} test: need at least {} observations per window (before={}, after={})",
            kind,
            MIN_TEST_SAMPLE,
            before.len(),
            after.len()
        );
        tracing::warn!("{}", msg);
        return TestResult::degraded(before, after, kind, alpha, vec![msg]);
    }

    if before.iter().chain(after).any(|v| !v.is_finite()) {
        return TestResult::degraded(
            before,
            after,
            kind,
            alpha,
            vec!["Samples contain non-finite values; test skipped".to_string()],
        );
    }

    let mut diagnostics = Diagnostics::default();
    let mut warnings = Vec::new();

    let variance_test = f_test(before, after, alpha);
    let resolved = match kind {
        TestKind::WelchT | TestKind::StudentT => {
            let equal = match options.assume_equal_variance {
                Some(explicit) => explicit,
                None if kind == TestKind::StudentT => true,
                None => variance_test.equal_variances,
            };
            diagnostics.variance = Some(variance_test.clone());
            if kind == TestKind::StudentT && !variance_test.equal_variances {
                warnings.push(format!(
                    "Variance ratio test rejects equal variances (F={:.3}, p={:.4}); Welch's t-test is more appropriate",
                    variance_test.f_statistic, variance_test.p_value
                ));
            }
            if equal {
                TestKind::StudentT
            } else {
                TestKind::WelchT
            }
        }
        other => other,
    };

    if options.validate_assumptions {
        let assessment = NormalityAssessment::of(before, after, alpha);
        if !assessment.assumptions_met && resolved.is_parametric() {
            warnings.push(format!(
                "Normality check failed (Jarque-Bera p_before={:.4}, p_after={:.4}); consider {}",
                assessment.before.p_value,
                assessment.after.p_value,
                TestKind::MannWhitneyU
            ));
        }
        diagnostics.normality = Some(assessment);
    }

    let outcome = match resolved {
        TestKind::WelchT => welch_t(before, after),
        TestKind::StudentT => student_t(before, after),
        TestKind::MannWhitneyU => mann_whitney(before, after),
        TestKind::Exact => exact_rank_test(before, after),
        TestKind::Permutation => {
            match permutation_test(before, after, options.permutation_iterations, resampler) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!("permutation test did not complete: {}", err);
                    let mut degraded = TestResult::degraded(
                        before,
                        after,
                        kind,
                        alpha,
                        vec![format!("Permutation test did not complete: {}", err)],
                    );
                    degraded.diagnostics = diagnostics;
                    return degraded;
                }
            }
        }
    };

    warnings.extend(outcome.warnings);
    let min_n = options.min_reliable_sample;
    if before.len() < min_n || after.len() < min_n {
        warnings.push(format!(
            "Small sample (before={}, after={}, recommended >= {}): interpret {} results with caution",
            before.len(),
            after.len(),
            min_n,
            outcome.kind
        ));
    }

    let mean_before = mean(before);
    let mean_after = mean(after);
    let p_value = crate::dist::clamp_probability(outcome.p_value);

    TestResult {
        kind: outcome.kind,
        requested_kind: kind,
        statistic: outcome.statistic,
        degrees_of_freedom: outcome.degrees_of_freedom,
        p_value,
        effect_size: outcome.effect_size,
        is_significant: p_value < alpha,
        alpha,
        n_before: before.len(),
        n_after: after.len(),
        mean_before,
        mean_after,
        direction: Direction::from_difference(mean_after - mean_before),
        detail: Some(outcome.detail),
        diagnostics,
        warnings,
        degraded: false,
    }
}
