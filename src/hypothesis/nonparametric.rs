// Rank and resampling tests: Mann-Whitney U, exact rank-sum, permutation
//
// Mann-Whitney uses tie-averaged ranks over the combined sample. The normal
// approximation applies the tie correction to the variance of U and a 0.5
// continuity correction. The exact test enumerates the conditional
// distribution of the (doubled) before rank sum over all splits of the
// observed ranks, so ties are handled exactly as well.

use super::{TestDetail, TestKind, TestOutcome};
use crate::descriptive::{mean, rank_with_ties, tie_group_sizes};
use crate::dist::normal_sf;
use crate::effect_size::{cohens_d, mann_whitney_u, rank_biserial};
use crate::error::Result;
use crate::sampling::{shuffle_with, Resampler};

/// Largest combined sample size enumerated by the exact test
pub const EXACT_TOTAL_LIMIT: usize = 20;

struct RankSummary {
    u_before: f64,
    u_after: f64,
    ties_present: bool,
    tie_term: f64,
}

fn rank_summary(before: &[f64], after: &[f64]) -> RankSummary {
    let (u_before, u_after) = mann_whitney_u(before, after);
    let mut combined = before.to_vec();
    combined.extend_from_slice(after);
    let ties = tie_group_sizes(&combined);
    let tie_term = ties
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    RankSummary {
        u_before,
        u_after,
        ties_present: !ties.is_empty(),
        tie_term,
    }
}

/// Signed z for U_after with tie and continuity corrections; `None` if σ = 0
fn normal_z(summary: &RankSummary, n1: f64, n2: f64) -> Option<f64> {
    let n = n1 + n2;
    let mean_u = n1 * n2 / 2.0;
    let sigma_sq = n1 * n2 / 12.0 * ((n + 1.0) - summary.tie_term / (n * (n - 1.0)));
    if sigma_sq <= f64::EPSILON {
        return None;
    }
    let diff = summary.u_after - mean_u;
    let corrected = (diff.abs() - 0.5).max(0.0);
    Some(corrected.copysign(diff) / sigma_sq.sqrt())
}

/// Mann-Whitney U test (normal approximation)
pub fn mann_whitney(before: &[f64], after: &[f64]) -> TestOutcome {
    let n1 = before.len() as f64;
    let n2 = after.len() as f64;
    let summary = rank_summary(before, after);
    let mut warnings = Vec::new();

    let (z, p_value) = match normal_z(&summary, n1, n2) {
        Some(z) => (z, 2.0 * normal_sf(z.abs())),
        None => {
            warnings.push("All observations are tied: rank test has no information".to_string());
            (0.0, 1.0)
        }
    };

    TestOutcome {
        kind: TestKind::MannWhitneyU,
        statistic: summary.u_before.min(summary.u_after),
        degrees_of_freedom: None,
        p_value: p_value.min(1.0),
        effect_size: rank_biserial(summary.u_before, summary.u_after),
        detail: TestDetail::MannWhitneyU {
            u_before: summary.u_before,
            u_after: summary.u_after,
            z,
            ties_present: summary.ties_present,
        },
        warnings,
    }
}

/// Number of ways to pick `k` of `items` for every possible sum
///
/// `counts[s]` is the number of size-`k` subsets summing to `s`.
fn subset_sum_counts(items: &[u32], k: usize) -> Vec<f64> {
    let max_sum: usize = items.iter().map(|&v| v as usize).sum();
    // dp[j][s]: subsets of size j with sum s
    let mut dp = vec![vec![0.0f64; max_sum + 1]; k + 1];
    dp[0][0] = 1.0;
    for &item in items {
        let item = item as usize;
        for j in (1..=k).rev() {
            for s in (item..=max_sum).rev() {
                let add = dp[j - 1][s - item];
                if add > 0.0 {
                    dp[j][s] += add;
                }
            }
        }
    }
    dp.swap_remove(k)
}

/// Exact (permutation-distribution) rank-sum test for small samples
///
/// Falls back to the normal approximation with a warning when the combined
/// sample exceeds `EXACT_TOTAL_LIMIT`.
pub fn exact_rank_test(before: &[f64], after: &[f64]) -> TestOutcome {
    let n1 = before.len();
    let n = n1 + after.len();
    let summary = rank_summary(before, after);
    let statistic = summary.u_before.min(summary.u_after);
    let effect_size = rank_biserial(summary.u_before, summary.u_after);

    if n > EXACT_TOTAL_LIMIT {
        let approx = mann_whitney(before, after);
        let mut warnings = approx.warnings;
        warnings.push(format!(
            "Combined sample of {} exceeds the exact enumeration limit of {}; using the normal approximation",
            n, EXACT_TOTAL_LIMIT
        ));
        return TestOutcome {
            kind: TestKind::Exact,
            statistic,
            degrees_of_freedom: None,
            p_value: approx.p_value,
            effect_size,
            detail: TestDetail::Exact {
                u_before: summary.u_before,
                u_after: summary.u_after,
                enumerated: false,
                arrangements: 0.0,
            },
            warnings,
        };
    }

    let mut combined = before.to_vec();
    combined.extend_from_slice(after);
    // Midranks are multiples of 0.5, so doubled ranks are exact integers
    let doubled: Vec<u32> = rank_with_ties(&combined)
        .iter()
        .map(|r| (r * 2.0).round() as u32)
        .collect();
    let observed: u32 = doubled[..n1].iter().sum();
    let expected = (n1 * (n + 1)) as f64;
    let observed_distance = (f64::from(observed) - expected).abs();

    let counts = subset_sum_counts(&doubled, n1);
    let total: f64 = counts.iter().sum();
    let extreme: f64 = counts
        .iter()
        .enumerate()
        .filter(|(sum, _)| (*sum as f64 - expected).abs() >= observed_distance - 1e-9)
        .map(|(_, &c)| c)
        .sum();

    let p_value = if total > 0.0 { extreme / total } else { 1.0 };

    TestOutcome {
        kind: TestKind::Exact,
        statistic,
        degrees_of_freedom: None,
        p_value: p_value.min(1.0),
        effect_size,
        detail: TestDetail::Exact {
            u_before: summary.u_before,
            u_after: summary.u_after,
            enumerated: true,
            arrangements: total,
        },
        warnings: Vec::new(),
    }
}

/// Two-sided permutation test on the difference in means
///
/// p = (extreme + 1) / (iterations + 1), so it is never exactly zero.
pub fn permutation_test(
    before: &[f64],
    after: &[f64],
    iterations: usize,
    resampler: &mut Resampler,
) -> Result<TestOutcome> {
    let n1 = before.len();
    let observed = mean(after) - mean(before);
    let mut pooled = before.to_vec();
    pooled.extend_from_slice(after);

    let pooled = &pooled;
    let diffs = resampler.run(iterations, |rng| {
        let mut shuffled = pooled.clone();
        shuffle_with(rng, &mut shuffled);
        mean(&shuffled[n1..]) - mean(&shuffled[..n1])
    })?;

    let threshold = observed.abs() - 1e-12;
    let extreme_count = diffs.iter().filter(|d| d.abs() >= threshold).count();
    let p_value = (extreme_count as f64 + 1.0) / (iterations as f64 + 1.0);

    Ok(TestOutcome {
        kind: TestKind::Permutation,
        statistic: observed,
        degrees_of_freedom: None,
        p_value,
        effect_size: cohens_d(before, after),
        detail: TestDetail::Permutation {
            observed_difference: observed,
            iterations,
            extreme_count,
        },
        warnings: Vec::new(),
    })
}
