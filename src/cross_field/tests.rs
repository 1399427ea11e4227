// Tests for cross-field correlation, dependency networks and composite impact

use super::*;
use crate::error::ImpactError;
use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn series(days: std::ops::Range<i64>, f: impl Fn(i64) -> f64) -> Vec<TimedValue> {
    days.map(|d| TimedValue::new(anchor() + Duration::days(d), f(d)))
        .collect()
}

fn wiggle(d: i64) -> f64 {
    (d * 37).rem_euclid(11) as f64
}

#[test]
fn test_pearson_and_spearman() {
    let x = [1.0, 2.0, 3.0, 4.0, 5.0];
    assert!((pearson(&x, &[2.0, 4.0, 6.0, 8.0, 10.0]) - 1.0).abs() < 1e-12);
    assert!((pearson(&x, &[5.0, 4.0, 3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
    assert_eq!(pearson(&x, &[3.0; 5]), 0.0);
    // Monotone but non-linear
    let cubes: Vec<f64> = x.iter().map(|v| v * v * v).collect();
    assert!(pearson(&x, &cubes) < 1.0);
    assert!((spearman(&x, &cubes) - 1.0).abs() < 1e-12);
}

#[test]
fn test_kendall_tau_b() {
    let x = [1.0, 2.0, 3.0, 4.0, 5.0];
    let y = [1.0, 3.0, 2.0, 5.0, 4.0];
    // 8 concordant, 2 discordant pairs
    assert!((kendall_tau_b(&x, &y) - 0.6).abs() < 1e-12);
    assert_eq!(kendall_tau_b(&x, &[1.0; 5]), 0.0);
}

#[test]
fn test_correlate_significance() {
    assert!(correlate(&[1.0, 2.0], &[1.0, 2.0], CorrelationMethod::Pearson).is_none());

    let x: Vec<f64> = (0..30).map(f64::from).collect();
    let perfect = correlate(&x, &x, CorrelationMethod::Pearson).unwrap();
    assert_eq!(perfect.n, 30);
    assert!(perfect.p_value < 1e-9);

    let flat = correlate(&x, &[1.0; 30], CorrelationMethod::Spearman).unwrap();
    assert_eq!(flat.coefficient, 0.0);
    assert_eq!(flat.p_value, 1.0);

    let kendall = correlate(&x, &x, CorrelationMethod::Kendall).unwrap();
    assert!((kendall.coefficient - 1.0).abs() < 1e-12);
    assert!(kendall.is_significant(0.05));
}

#[test]
fn test_correlation_change_classification() {
    assert_eq!(
        CorrelationChange::classify(0.1, 0.6, 0.2),
        CorrelationChange::Strengthened
    );
    assert_eq!(
        CorrelationChange::classify(-0.8, 0.3, 0.2),
        CorrelationChange::Weakened
    );
    // Sign flips with similar magnitude are not a change in strength
    assert_eq!(
        CorrelationChange::classify(0.5, -0.55, 0.2),
        CorrelationChange::Negligible
    );
}

#[test]
fn test_correlation_matrix_pre_post() {
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), series(-20..20, wiggle));
    fields.insert("b".to_string(), series(-20..20, |d| 2.0 * wiggle(d) + 5.0));
    fields.insert(
        "c".to_string(),
        series(-20..20, |d| if d < 0 { wiggle(d) } else { 4.0 }),
    );

    let matrix = correlation_matrix(
        &fields,
        anchor(),
        CorrelationMethod::Pearson,
        DEFAULT_CHANGE_THRESHOLD,
    )
    .unwrap();
    assert_eq!(matrix.pairs.len(), 3);

    let ab = matrix.get("b", "a").unwrap();
    assert!((ab.pre_event.unwrap().coefficient - 1.0).abs() < 1e-9);
    assert!((ab.post_event.unwrap().coefficient - 1.0).abs() < 1e-9);
    assert_eq!(ab.change, Some(CorrelationChange::Negligible));

    let ac = matrix.get("a", "c").unwrap();
    assert_eq!(ac.change, Some(CorrelationChange::Weakened));
    assert_eq!(matrix.changed_pairs().count(), 2);

    let pre = matrix.pre_event_matrix();
    assert_eq!(pre[0][0], Some(1.0));
    assert_eq!(pre[0][1], pre[1][0]);
}

#[test]
fn test_correlation_matrix_validation() {
    let mut fields = BTreeMap::new();
    fields.insert("only".to_string(), series(-5..5, wiggle));
    assert!(matches!(
        correlation_matrix(&fields, anchor(), CorrelationMethod::Pearson, 0.2),
        Err(ImpactError::Validation(_))
    ));
    fields.insert("other".to_string(), series(-5..5, wiggle));
    assert!(matches!(
        correlation_matrix(&fields, anchor(), CorrelationMethod::Pearson, 1.5),
        Err(ImpactError::Validation(_))
    ));
    assert!("spearman".parse::<CorrelationMethod>().is_ok());
    assert!("distance".parse::<CorrelationMethod>().is_err());
}

fn driven_pair(coefficient: f64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(7);
    let x: Vec<f64> = (0..80).map(|_| rng.gen_range(0.0..1.0)).collect();
    let mut y = vec![0.0; 80];
    for t in 1..80 {
        y[t] = coefficient * x[t - 1] + 0.05 * rng.gen_range(-1.0..1.0);
    }
    (x, y)
}

#[test]
fn test_granger_detects_lagged_driver() {
    let (x, y) = driven_pair(0.8);
    let result = granger_test(&x, &y, 1).unwrap();
    assert!(result.p_value < 1e-6);
    assert!(result.strength > 0.5);
    assert_eq!(result.sign, EdgeSign::Positive);
    assert_eq!(result.observations, 79);

    let (x, y) = driven_pair(-0.8);
    assert_eq!(granger_test(&x, &y, 2).unwrap().sign, EdgeSign::Negative);
}

#[test]
fn test_granger_degenerate_inputs() {
    assert!(granger_test(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 1).is_none());
    assert!(granger_test(&[1.0; 20], &[1.0; 20], 0).is_none());
    let x: Vec<f64> = (0..20).map(f64::from).collect();
    assert!(granger_test(&x, &[5.0; 20], 1).is_none());
}

#[test]
fn test_build_network_finds_driver_edge() {
    let (x, y) = driven_pair(0.8);
    let mut fields = BTreeMap::new();
    fields.insert("driver".to_string(), series(0..80, |d| x[d as usize]));
    fields.insert("follower".to_string(), series(0..80, |d| y[d as usize]));

    let network = build_dependency_network(&fields, &NetworkOptions::default()).unwrap();
    let edge = network.edge("driver", "follower").expect("driver edge");
    assert!((1..=3).contains(&edge.lag));
    assert_eq!(edge.sign, EdgeSign::Positive);
    assert!(network.node("driver").unwrap().out_degree >= 1);
    assert!(network.warnings.is_empty());
}

#[test]
fn test_build_network_sparse_overlap_warns() {
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), series(0..5, wiggle));
    fields.insert("b".to_string(), series(0..5, wiggle));
    let network = build_dependency_network(&fields, &NetworkOptions::default()).unwrap();
    assert_eq!(network.edge_count(), 0);
    assert_eq!(network.warnings.len(), 1);
    assert!(network.is_dag);
}

#[test]
fn test_build_network_validation() {
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), series(0..30, wiggle));
    assert!(matches!(
        build_dependency_network(&fields, &NetworkOptions::default()),
        Err(ImpactError::Validation(_))
    ));
    fields.insert("b".to_string(), series(0..30, wiggle));
    let bad = NetworkOptions {
        max_lag: 0,
        ..NetworkOptions::default()
    };
    assert!(build_dependency_network(&fields, &bad).is_err());
}

fn edge(from: &str, to: &str, weight: f64) -> DependencyEdge {
    DependencyEdge {
        from: from.to_string(),
        to: to.to_string(),
        lag: 1,
        f_statistic: 10.0,
        p_value: 0.001,
        weight,
        sign: EdgeSign::Positive,
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_network_cycle_detection() {
    let network = DependencyNetwork::from_edges(
        names(&["a", "b", "c", "d"]),
        vec![
            edge("a", "b", 0.5),
            edge("b", "c", 0.5),
            edge("c", "a", 0.5),
            edge("c", "d", 0.5),
        ],
        10,
    );
    assert!(!network.is_dag);
    assert!(network.has_cycles());
    assert_eq!(network.cycles, vec![names(&["a", "b", "c"])]);
    assert!(network.topological_order.is_none());
}

#[test]
fn test_network_cycle_listing_is_capped() {
    let edges = vec![
        edge("a", "b", 0.1),
        edge("b", "a", 0.1),
        edge("b", "c", 0.1),
        edge("c", "b", 0.1),
    ];
    let all = DependencyNetwork::from_edges(names(&["a", "b", "c"]), edges.clone(), 10);
    assert_eq!(all.cycles.len(), 2);
    assert!(!all.cycles_truncated);

    let capped = DependencyNetwork::from_edges(names(&["a", "b", "c"]), edges, 1);
    assert_eq!(capped.cycles.len(), 1);
    assert!(capped.cycles_truncated);
}

#[test]
fn test_acyclic_network_metrics() {
    let network = DependencyNetwork::from_edges(
        names(&["a", "b", "c"]),
        vec![edge("a", "b", 0.5), edge("b", "c", 0.2), edge("a", "c", 0.4)],
        10,
    );
    assert!(network.is_dag);
    assert_eq!(network.topological_order, Some(names(&["a", "b", "c"])));
    assert_eq!(network.strongest_driver.as_deref(), Some("a"));
    assert_eq!(network.most_influenced.as_deref(), Some("c"));

    let b = network.node("b").unwrap();
    assert_eq!((b.in_degree, b.out_degree), (1, 1));
    assert_eq!(network.descendants("b"), names(&["b", "c"]));
    assert_eq!(network.descendants("a").len(), 3);
}

#[test]
fn test_unknown_edge_fields_are_dropped() {
    let network = DependencyNetwork::from_edges(names(&["a"]), vec![edge("a", "zz", 1.0)], 10);
    assert_eq!(network.edge_count(), 0);
    assert_eq!(network.strongest_driver, None);
}

#[test]
fn test_composite_aggregations() {
    let impacts = [FieldImpact::new("a", 2.0, 1.0), FieldImpact::new("b", 8.0, 1.0)];
    let value = |m| composite_impact(&impacts, m).unwrap().value;
    assert!((value(AggregationMethod::Sum) - 10.0).abs() < 1e-12);
    assert!((value(AggregationMethod::WeightedMean) - 5.0).abs() < 1e-12);
    assert!((value(AggregationMethod::GeometricMean) - 4.0).abs() < 1e-12);
    assert!((value(AggregationMethod::HarmonicMean) - 3.2).abs() < 1e-12);

    let result = composite_impact(&impacts, AggregationMethod::Sum).unwrap();
    assert_eq!(result.dominant_field.as_deref(), Some("b"));
    assert!((result.dominance_index.unwrap() - 4.0).abs() < 1e-12);
    assert!((result.contributions[0].share - 0.2).abs() < 1e-12);
    assert!((result.contributions[1].share - 0.8).abs() < 1e-12);
}

#[test]
fn test_composite_negative_impacts_keep_sign() {
    let impacts = [FieldImpact::new("a", -2.0, 1.0), FieldImpact::new("b", -8.0, 1.0)];
    let result = composite_impact(&impacts, AggregationMethod::GeometricMean).unwrap();
    assert!((result.value + 4.0).abs() < 1e-12);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_composite_zero_runner_up() {
    let impacts = [FieldImpact::new("a", 3.0, 1.0), FieldImpact::new("b", 0.0, 1.0)];
    let result = composite_impact(&impacts, AggregationMethod::HarmonicMean).unwrap();
    assert_eq!(result.value, 0.0);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.dominant_field.as_deref(), Some("a"));
    assert_eq!(result.dominance_index, None);
}

#[test]
fn test_composite_validation() {
    assert!(composite_impact(&[], AggregationMethod::Sum).is_err());
    assert!(composite_impact(&[FieldImpact::new("a", 1.0, -1.0)], AggregationMethod::Sum).is_err());
    assert!(composite_impact(&[FieldImpact::new("a", 1.0, 0.0)], AggregationMethod::Sum).is_err());
    assert_eq!(
        "harmonic".parse::<AggregationMethod>().unwrap(),
        AggregationMethod::HarmonicMean
    );
    assert!(matches!(
        "median".parse::<AggregationMethod>(),
        Err(ImpactError::UnsupportedMethod { .. })
    ));
}
