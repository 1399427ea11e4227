// Tests for report orchestration, caching and recommendations

use super::recommendation::recommend;
use super::*;
use crate::bayesian::PriorScale;
use crate::config::EngineConfig;
use crate::hypothesis::TestOptions;
use crate::power::{analyze_power, PowerSpec};
use crate::provider::InMemoryProvider;
use crate::window::TimedValue;
use chrono::{Duration, TimeZone};
use std::sync::Arc;

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn series(f: impl Fn(i64) -> f64) -> Vec<TimedValue> {
    (-30..30)
        .map(|d| TimedValue::new(anchor() + Duration::days(d) + Duration::hours(9), f(d)))
        .collect()
}

/// sentiment steps up by 4 at the anchor, volume only wiggles, flat is a
/// constant step with no spread
fn provider() -> InMemoryProvider {
    InMemoryProvider::new()
        .with_event("launch", anchor())
        .with_series(
            "acme",
            "sentiment",
            series(|d| {
                let base = if d < 0 { 10.0 } else { 14.0 };
                base + (d * 7).rem_euclid(5) as f64 * 0.3
            }),
        )
        .with_series(
            "acme",
            "volume",
            series(|d| 50.0 + (d * 3).rem_euclid(7) as f64),
        )
        .with_series("acme", "flat", series(|d| if d < 0 { 5.0 } else { 7.0 }))
        .with_sample("acme", "sparse", anchor() - Duration::days(3), 1.0)
        .with_sample("acme", "sparse", anchor() + Duration::days(3), 2.0)
}

fn test_config() -> EngineConfig {
    EngineConfig {
        bootstrap_iterations: 500,
        permutation_iterations: 500,
        posterior_draws: 500,
        worker_threads: 1,
        seed: Some(42),
        ..EngineConfig::default()
    }
}

fn engine() -> ImpactEngine<InMemoryProvider> {
    ImpactEngine::with_config(provider(), test_config()).unwrap()
}

#[test]
fn test_status_transitions() {
    assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Computing));
    assert!(ReportStatus::Computing.can_transition_to(ReportStatus::Partial));
    assert!(!ReportStatus::Pending.can_transition_to(ReportStatus::Complete));
    assert!(!ReportStatus::Complete.can_transition_to(ReportStatus::Computing));
    assert!(ReportStatus::Failed.is_terminal());
    assert!(!ReportStatus::Computing.is_terminal());

    let mut tracker = StatusTracker::new();
    assert!(tracker.advance(ReportStatus::Complete).is_err());
    tracker.advance(ReportStatus::Computing).unwrap();
    tracker.advance(ReportStatus::Complete).unwrap();
    assert_eq!(
        tracker.into_history(),
        vec![
            ReportStatus::Pending,
            ReportStatus::Computing,
            ReportStatus::Complete
        ]
    );
}

#[test]
fn test_options_hash_ignores_field_order() {
    let a = ReportOptions::for_fields(["volume", "sentiment"]);
    let b = ReportOptions::for_fields(["sentiment", "volume", "sentiment"]);
    assert_eq!(a.options_hash().unwrap(), b.options_hash().unwrap());

    let c = ReportOptions {
        window: WindowSpec::new(14, 14),
        ..ReportOptions::for_fields(["sentiment", "volume"])
    };
    assert_ne!(a.options_hash().unwrap(), c.options_hash().unwrap());
}

#[test]
fn test_options_validation() {
    assert!(ReportOptions::default().validate().is_err());
    assert!(ReportOptions::for_fields([" "]).validate().is_err());
    assert!(ReportOptions::for_fields(["nps"]).validate().is_ok());

    let mut weights = BTreeMap::new();
    weights.insert("nps".to_string(), -1.0);
    let options = ReportOptions {
        cross_field: Some(CrossFieldOptions {
            field_weights: weights,
            ..CrossFieldOptions::default()
        }),
        ..ReportOptions::for_fields(["nps"])
    };
    assert!(options.validate().is_err());
}

#[test]
fn test_analysis_id_is_stable_hex() {
    let id = analysis_id("launch", 7, 0);
    assert_eq!(id.len(), 64);
    assert_eq!(id, analysis_id("launch", 7, 0));
    assert_ne!(id, analysis_id("launch", 7, 1));
    assert_ne!(id, analysis_id("launch", 8, 0));
}

#[test]
fn test_complete_report() {
    let engine = engine();
    let options = ReportOptions::for_fields(["sentiment", "volume"]);
    let report = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();

    assert_eq!(report.status, ReportStatus::Complete, "{:?}", report.warnings);
    assert_eq!(
        report.status_history,
        vec![
            ReportStatus::Pending,
            ReportStatus::Computing,
            ReportStatus::Complete
        ]
    );
    assert_eq!(report.fields.len(), 2);

    let sentiment = report.field("sentiment").unwrap();
    assert!(sentiment.testable);
    assert!(sentiment.significant_after_correction);
    assert_eq!(sentiment.test.direction.as_str(), "increase");
    assert!(sentiment.effect_sizes.is_some());
    assert!(sentiment.power.is_some());
    assert!(sentiment.confidence_intervals.is_some());
    assert!(sentiment.bayesian.is_some());
    assert!(sentiment.temporal.is_some());

    let volume = report.field("volume").unwrap();
    assert!(!volume.significant_after_correction);

    let correction = report.correction.as_ref().unwrap();
    assert_eq!(correction.p_values.len(), 2);

    let cross = report.cross_field.as_ref().unwrap();
    assert!(cross.correlations.is_some());
    assert!(cross.network.is_some());
    let composite = cross.composite.as_ref().unwrap();
    assert_eq!(composite.dominant_field.as_deref(), Some("sentiment"));

    assert_eq!(report.recommendation.action, RecommendedAction::Act);
    assert_eq!(
        report.recommendation.primary_field.as_deref(),
        Some("sentiment")
    );
    assert_eq!(report.significant_fields(), vec!["sentiment"]);
}

#[test]
fn test_failed_component_gives_partial_report() {
    let engine = engine();
    let options = ReportOptions {
        bayesian: Some(BayesianPrior {
            scale: PriorScale::MeanDifference,
            ..BayesianPrior::default()
        }),
        cross_field: None,
        ..ReportOptions::for_fields(["flat"])
    };
    let report = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();

    assert_eq!(report.status, ReportStatus::Partial);
    assert!(report.is_partial());
    let flat = report.field("flat").unwrap();
    assert!(flat.bayesian.is_none());
    assert_eq!(flat.failed_components, vec!["bayesian analysis".to_string()]);
    assert!(flat
        .warnings
        .iter()
        .any(|w| w.starts_with("bayesian analysis failed for flat")));
    // Other components still ran
    assert!(flat.effect_sizes.is_some());
    assert!(flat.temporal.is_some());
}

#[test]
fn test_untestable_field_gives_partial_report() {
    let engine = engine();
    let report = engine
        .generate_comprehensive_report("launch", &ReportOptions::for_fields(["sentiment", "sparse"]))
        .unwrap();
    assert_eq!(report.status, ReportStatus::Partial);
    let sparse = report.field("sparse").unwrap();
    assert!(!sparse.testable);
    assert!(sparse.test.degraded);
    assert!(sparse.adjusted_p_value.is_none());
    // One testable field: no cross-field section
    assert!(report.cross_field.is_none());
    assert!(report.warnings.iter().any(|w| w.contains("'sparse'")));
}

#[test]
fn test_no_testable_field_gives_failed_report() {
    let engine = engine();
    let report = engine
        .generate_comprehensive_report("launch", &ReportOptions::for_fields(["sparse", "missing"]))
        .unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert!(report.correction.is_none());
    assert_eq!(
        report.recommendation.action,
        RecommendedAction::CollectMoreData
    );
    assert!(report.to_report_string().contains("IMPACT REPORT FAILED"));
}

#[test]
fn test_unknown_event_propagates_not_found() {
    let engine = engine();
    let err = engine
        .generate_comprehensive_report("recall", &ReportOptions::for_fields(["sentiment"]))
        .unwrap_err();
    assert!(matches!(err, ImpactError::NotFound { kind: "event", .. }));
    // Failed builds are not cached
    assert!(engine.cache().is_empty());
}

#[test]
fn test_empty_field_list_is_validation_error() {
    let engine = engine();
    assert!(matches!(
        engine.generate_comprehensive_report("launch", &ReportOptions::default()),
        Err(ImpactError::Validation(_))
    ));
}

#[test]
fn test_reports_are_cached_per_options() {
    let engine = engine();
    let options = ReportOptions::minimal(["sentiment", "volume"]);
    let first = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    let reordered = ReportOptions::minimal(["volume", "sentiment"]);
    let second = engine
        .generate_comprehensive_report("launch", &reordered)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cache().builds(), 1);

    let other = ReportOptions {
        window: WindowSpec::new(10, 10),
        ..options
    };
    let third = engine
        .generate_comprehensive_report("launch", &other)
        .unwrap();
    assert_ne!(first.analysis_id, third.analysis_id);
    assert_eq!(engine.cache().builds(), 2);
    assert_eq!(engine.cache().len(), 2);
}

#[test]
fn test_cache_drops_least_recently_used_report() {
    let config = EngineConfig {
        cache_capacity: 2,
        ..test_config()
    };
    let engine = ImpactEngine::with_config(provider(), config).unwrap();
    assert_eq!(engine.cache().capacity(), 2);
    let request = |field: &str| {
        engine
            .generate_comprehensive_report("launch", &ReportOptions::minimal([field]))
            .unwrap()
    };

    let sentiment = request("sentiment");
    request("volume");
    // Touch sentiment so volume becomes the oldest entry
    assert!(Arc::ptr_eq(&sentiment, &request("sentiment")));
    request("flat");
    assert_eq!(engine.cache().len(), 2);
    assert_eq!(engine.cache().builds(), 3);

    assert!(Arc::ptr_eq(&sentiment, &request("sentiment")));
    assert_eq!(engine.cache().builds(), 3);
    request("volume");
    assert_eq!(engine.cache().builds(), 4);
    assert_eq!(engine.cache().len(), 2);
}

#[test]
fn test_invalidate_rebuilds_with_new_id() {
    let engine = engine();
    let options = ReportOptions::minimal(["sentiment"]);
    let first = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    engine.invalidate();
    let second = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.analysis_id, second.analysis_id);
    assert_eq!(first.options_hash, second.options_hash);
}

#[test]
fn test_seeded_reports_are_reproducible() {
    let options = ReportOptions {
        seed: Some(9),
        ..ReportOptions::for_fields(["sentiment", "volume"])
    };
    let a = engine()
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    let b = engine()
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    assert_eq!(a.analysis_id, b.analysis_id);
    for (fa, fb) in a.fields.iter().zip(&b.fields) {
        assert_eq!(fa.test.p_value, fb.test.p_value);
        assert_eq!(fa.confidence_intervals, fb.confidence_intervals);
        assert_eq!(
            fa.bayesian.as_ref().map(|r| r.diagnostics.monte_carlo_mean),
            fb.bayesian.as_ref().map(|r| r.diagnostics.monte_carlo_mean)
        );
    }
}

#[test]
fn test_engine_single_operations() {
    let engine = engine();
    let window = WindowSpec::default();
    let result = engine
        .run_hypothesis_test(
            "launch",
            &EntityScope::all(),
            "sentiment",
            &window,
            TestKind::MannWhitneyU,
            &TestOptions::default(),
        )
        .unwrap();
    assert_eq!(result.kind, TestKind::MannWhitneyU);
    assert!(result.is_significant);

    let temporal = engine
        .analyze_temporal_dynamics(
            "launch",
            &EntityScope::all(),
            "sentiment",
            &TemporalSpec::default(),
        )
        .unwrap();
    assert!(temporal.weighted_impact > 3.0);

    let fields = vec!["sentiment".to_string(), "volume".to_string()];
    let network = engine
        .build_dependency_network(
            "launch",
            &EntityScope::all(),
            &fields,
            &window,
            &NetworkOptions::default(),
        )
        .unwrap();
    assert_eq!(network.node_count(), 2);

    assert!(matches!(
        engine.run_hypothesis_test(
            "recall",
            &EntityScope::all(),
            "sentiment",
            &window,
            TestKind::WelchT,
            &TestOptions::default(),
        ),
        Err(ImpactError::NotFound { .. })
    ));
}

#[test]
fn test_invalid_engine_config_is_rejected() {
    let config = EngineConfig {
        significance_level: 0.0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        ImpactEngine::with_config(provider(), config),
        Err(ImpactError::Config(_))
    ));
}

fn analysis(field: &str, p: f64, significant: bool, effect: f64) -> FieldAnalysis {
    let mut test = TestResult::degraded(&[1.0, 2.0], &[3.0, 4.0], TestKind::WelchT, 0.05, vec![]);
    test.p_value = p;
    test.effect_size = effect;
    test.degraded = false;
    FieldAnalysis {
        field: field.to_string(),
        test,
        testable: true,
        adjusted_p_value: Some(p),
        significant_after_correction: significant,
        effect_sizes: None,
        power: None,
        confidence_intervals: None,
        bayesian: None,
        temporal: None,
        failed_components: Vec::new(),
        warnings: Vec::new(),
    }
}

#[test]
fn test_recommendation_rules() {
    let act = recommend(
        &[analysis("nps", 0.001, true, 0.9), analysis("csat", 0.2, false, 0.1)],
        None,
        ReportStatus::Complete,
    );
    assert_eq!(act.action, RecommendedAction::Act);
    assert_eq!(act.primary_field.as_deref(), Some("nps"));

    let monitor = recommend(&[analysis("nps", 0.01, true, 0.2)], None, ReportStatus::Complete);
    assert_eq!(monitor.action, RecommendedAction::Monitor);

    let mut weak = analysis("nps", 0.4, false, 0.2);
    weak.power = Some(analyze_power(&PowerSpec::achieved_power(0.2, 0.05, 10)).unwrap());
    let more = recommend(&[weak], None, ReportStatus::Partial);
    assert_eq!(more.action, RecommendedAction::CollectMoreData);
    assert!(more.details.iter().any(|d| d.contains("failed")));

    let none = recommend(&[analysis("nps", 0.6, false, 0.0)], None, ReportStatus::Complete);
    assert_eq!(none.action, RecommendedAction::NoAction);
}

#[test]
fn test_report_rendering() {
    let engine = engine();
    let report = engine
        .generate_comprehensive_report("launch", &ReportOptions::for_fields(["sentiment", "volume"]))
        .unwrap();
    let text = report.to_report_string();
    assert!(text.contains("IMPACT REPORT COMPLETE"));
    assert!(text.contains("sentiment"));
    assert!(text.contains("Recommendation (act)"));

    let json = report.to_json_string().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["status"], "complete");
    assert_eq!(value["event"]["event_id"], "launch");
}
