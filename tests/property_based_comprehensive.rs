//! Comprehensive property-based tests for the statistical core
//!
//! Covers the invariants every analysis relies on:
//! 1. Effect sizes: antisymmetry of Cohen's d, U1 + U2 = n1·n2
//! 2. Hypothesis tests: p-values in [0, 1] for every test kind
//! 3. Corrections: Bonferroni threshold, monotone adjusted p-values, determinism
//! 4. Power: sample size decreasing in effect size, non-decreasing in power
//! 5. Decay: weight(0) == max_weight, bounded and non-increasing
//! 6. Windows and composites: partition at the anchor, shares summing to one

use chrono::{Duration, TimeZone, Utc};
use eventshift::correction::{correct_for_multiple_comparisons, CorrectionMethod};
use eventshift::cross_field::{composite_impact, pearson, AggregationMethod, FieldImpact};
use eventshift::effect_size::{cohens_d, mann_whitney_u};
use eventshift::hypothesis::{run_test, TestKind, TestOptions};
use eventshift::power::{required_sample_size, Tails};
use eventshift::sampling::Resampler;
use eventshift::temporal::{DecayFunction, DecayStrategy, DecayType};
use eventshift::window::{TimedValue, WindowSpec};
use proptest::prelude::*;

fn sample() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1000.0f64..1000.0, 2..40)
}

fn p_values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..=1.0, 1..30)
}

fn ascending_order(p: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p.len()).collect();
    order.sort_by(|&a, &b| p[a].total_cmp(&p[b]));
    order
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_cohens_d_flips_sign_on_swap(a in sample(), b in sample()) {
        let forward = cohens_d(&a, &b);
        let backward = cohens_d(&b, &a);
        prop_assert!((forward + backward).abs() < 1e-9);
        prop_assert!((forward.abs() - backward.abs()).abs() < 1e-9);
    }

    #[test]
    fn prop_mann_whitney_u_sums_to_pairs(a in sample(), b in sample()) {
        let (u1, u2) = mann_whitney_u(&a, &b);
        prop_assert_eq!(u1 + u2, (a.len() * b.len()) as f64);
    }

    #[test]
    fn prop_rounded_samples_keep_u_sum(
        a in prop::collection::vec(0u8..5, 1..20),
        b in prop::collection::vec(0u8..5, 1..20),
    ) {
        // Heavy ties
        let a: Vec<f64> = a.into_iter().map(f64::from).collect();
        let b: Vec<f64> = b.into_iter().map(f64::from).collect();
        let (u1, u2) = mann_whitney_u(&a, &b);
        prop_assert_eq!(u1 + u2, (a.len() * b.len()) as f64);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(60))]

    #[test]
    fn prop_p_values_are_probabilities(a in sample(), b in sample(), seed in any::<u64>()) {
        let options = TestOptions {
            permutation_iterations: 200,
            validate_assumptions: true,
            ..TestOptions::default()
        };
        for kind in [
            TestKind::WelchT,
            TestKind::StudentT,
            TestKind::MannWhitneyU,
            TestKind::Permutation,
            TestKind::Exact,
        ] {
            let mut resampler = Resampler::seeded(seed);
            let result = run_test(&a, &b, kind, &options, &mut resampler);
            prop_assert!((0.0..=1.0).contains(&result.p_value), "{:?}: {}", kind, result.p_value);
            prop_assert!(result.statistic.is_finite() || result.statistic.is_infinite());
            prop_assert!(!result.effect_size.is_nan());
        }
    }

    #[test]
    fn prop_undersized_samples_never_significant(
        a in prop::collection::vec(-10.0f64..10.0, 0..2),
        b in sample(),
    ) {
        let mut resampler = Resampler::seeded(1);
        let result = run_test(&a, &b, TestKind::WelchT, &TestOptions::default(), &mut resampler);
        prop_assert!(!result.is_significant);
        prop_assert!(!result.warnings.is_empty());
        prop_assert_eq!(result.p_value, 1.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_bonferroni_threshold(p in p_values(), alpha in 0.001f64..0.5) {
        let result = correct_for_multiple_comparisons(&p, CorrectionMethod::Bonferroni, alpha).unwrap();
        prop_assert!((result.corrected_alpha - alpha / p.len() as f64).abs() < 1e-15);
    }

    #[test]
    fn prop_adjusted_p_monotone_by_rank(p in p_values(), alpha in 0.001f64..0.5) {
        for method in [
            CorrectionMethod::Bonferroni,
            CorrectionMethod::Holm,
            CorrectionMethod::BenjaminiHochberg,
        ] {
            let result = correct_for_multiple_comparisons(&p, method, alpha).unwrap();
            let order = ascending_order(&p);
            for pair in order.windows(2) {
                prop_assert!(
                    result.adjusted_p_values[pair[0]] <= result.adjusted_p_values[pair[1]] + 1e-12,
                    "{:?} not monotone", method
                );
            }
            for (adjusted, raw) in result.adjusted_p_values.iter().zip(&p) {
                prop_assert!(*adjusted >= *raw - 1e-12);
                prop_assert!(*adjusted <= 1.0);
            }
            prop_assert_eq!(result.rejected_count, result.rejected.len());
        }
    }

    #[test]
    fn prop_correction_is_deterministic(p in p_values()) {
        for method in [CorrectionMethod::Holm, CorrectionMethod::BenjaminiHochberg] {
            let first = correct_for_multiple_comparisons(&p, method, 0.05).unwrap();
            let second = correct_for_multiple_comparisons(&p, method, 0.05).unwrap();
            prop_assert_eq!(first.rejected, second.rejected);
        }
    }

    #[test]
    fn prop_fdr_rejects_at_least_fwer(p in p_values()) {
        let bonferroni = correct_for_multiple_comparisons(&p, CorrectionMethod::Bonferroni, 0.05).unwrap();
        let holm = correct_for_multiple_comparisons(&p, CorrectionMethod::Holm, 0.05).unwrap();
        let bh = correct_for_multiple_comparisons(&p, CorrectionMethod::BenjaminiHochberg, 0.05).unwrap();
        prop_assert!(bonferroni.rejected_count <= holm.rejected_count);
        prop_assert!(holm.rejected_count <= bh.rejected_count);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_sample_size_decreases_with_effect(
        d in 0.05f64..2.0,
        step in 0.01f64..1.0,
        power in 0.5f64..0.99,
    ) {
        let small = required_sample_size(d, 0.05, power, Tails::Two);
        let large = required_sample_size(d + step, 0.05, power, Tails::Two);
        prop_assert!(large < small);
    }

    #[test]
    fn prop_sample_size_grows_with_power(
        d in 0.05f64..2.0,
        power in 0.001f64..0.9,
        step in 0.001f64..0.099,
        two_tailed in any::<bool>(),
    ) {
        // Includes targets at or below alpha / tails
        let tails = if two_tailed { Tails::Two } else { Tails::One };
        let low = required_sample_size(d, 0.05, power, tails);
        let high = required_sample_size(d, 0.05, power + step, tails);
        prop_assert!(low >= 0.0);
        prop_assert!(high >= low);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_decay_weights_bounded_and_non_increasing(
        half_life in 0.5f64..60.0,
        min_weight in 0.0f64..0.5,
        max_weight in 0.5f64..3.0,
        d1 in 0.0f64..120.0,
        gap in 0.0f64..60.0,
    ) {
        for decay_type in [
            DecayType::Exponential,
            DecayType::Linear,
            DecayType::Gaussian,
            DecayType::Polynomial,
        ] {
            let f = DecayFunction::new(decay_type, half_life).with_bounds(min_weight, max_weight);
            prop_assert!((f.weight(0.0) - max_weight).abs() < 1e-12);
            let near = f.weight(d1);
            let far = f.weight(d1 + gap);
            prop_assert!(far <= near + 1e-12, "{:?}", decay_type);
            prop_assert!(near >= min_weight - 1e-12 && near <= max_weight + 1e-12);
            // Symmetric in direction
            prop_assert!((f.weight(-d1) - near).abs() < 1e-12);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_partition_splits_at_anchor(offsets in prop::collection::vec(-50i64..50, 0..60)) {
        let anchor = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let series: Vec<TimedValue> = offsets
            .iter()
            .map(|&h| TimedValue::new(anchor + Duration::hours(h * 12), h as f64))
            .collect();
        let spec = WindowSpec::new(10, 10);
        let pair = spec.partition(anchor, &series);
        prop_assert_eq!(pair.before.end, anchor);
        prop_assert_eq!(pair.after.start, anchor);
        prop_assert!(pair.before.points.iter().all(|p| p.timestamp < anchor));
        prop_assert!(pair.after.points.iter().all(|p| p.timestamp >= anchor));
        let in_range = series.iter().filter(|p| spec.range(anchor).contains(p.timestamp)).count();
        prop_assert_eq!(pair.before.len() + pair.after.len(), in_range);
    }

    #[test]
    fn prop_composite_shares_sum_to_one(
        impacts in prop::collection::vec((-5.0f64..5.0, 0.1f64..3.0), 1..8),
    ) {
        prop_assume!(impacts.iter().any(|(v, _)| v.abs() > 1e-6));
        let fields: Vec<FieldImpact> = impacts
            .iter()
            .enumerate()
            .map(|(i, &(v, w))| FieldImpact::new(format!("f{}", i), v, w))
            .collect();
        let composite = composite_impact(&fields, AggregationMethod::Sum).unwrap();
        let total: f64 = composite.contributions.iter().map(|c| c.share).sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
        if let Some(index) = composite.dominance_index {
            prop_assert!(index >= 1.0);
        }
    }

    #[test]
    fn prop_pearson_is_bounded(pairs in prop::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 3..40)) {
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let r = pearson(&x, &y);
        prop_assert!((-1.0..=1.0).contains(&r));
    }
}
