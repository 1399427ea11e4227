//! Report orchestration against real providers
//!
//! Single-flight caching under concurrent requests, provider error
//! propagation, and end-to-end reports from the JSON fixture.

use chrono::{DateTime, Utc};
use eventshift::config::EngineConfig;
use eventshift::provider::{DataProvider, EventAnchor, JsonFileProvider};
use eventshift::report::{ImpactEngine, RecommendedAction, ReportOptions, ReportStatus};
use eventshift::window::{EntityScope, TimeRange, TimedValue};
use eventshift::{ImpactError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/launch.json")
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        bootstrap_iterations: 400,
        permutation_iterations: 400,
        posterior_draws: 400,
        worker_threads: 2,
        seed: Some(3),
        ..EngineConfig::default()
    }
}

fn engine() -> ImpactEngine<JsonFileProvider> {
    let provider = JsonFileProvider::from_path(fixture()).unwrap();
    ImpactEngine::with_config(provider, fast_config()).unwrap()
}

/// Counts fetches so tests can observe duplicated work
struct CountingProvider {
    inner: JsonFileProvider,
    fetches: AtomicUsize,
}

impl DataProvider for CountingProvider {
    fn fetch_samples(
        &self,
        scope: &EntityScope,
        field: &str,
        range: TimeRange,
    ) -> Result<Vec<TimedValue>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
        self.inner.fetch_samples(scope, field, range)
    }

    fn get_event_anchor(&self, event_id: &str) -> Result<EventAnchor> {
        self.inner.get_event_anchor(event_id)
    }
}

/// Provider whose backing store is unreachable
struct OfflineProvider;

impl DataProvider for OfflineProvider {
    fn fetch_samples(&self, _: &EntityScope, _: &str, _: TimeRange) -> Result<Vec<TimedValue>> {
        Err(ImpactError::Provider("connection refused".to_string()))
    }

    fn get_event_anchor(&self, event_id: &str) -> Result<EventAnchor> {
        let ts: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        Ok(EventAnchor::new(event_id, ts))
    }
}

#[test]
fn test_fixture_report_is_complete() {
    let engine = engine();
    let report = engine
        .generate_comprehensive_report("launch", &ReportOptions::for_fields(["sentiment", "volume"]))
        .unwrap();

    assert_eq!(report.status, ReportStatus::Complete, "{:?}", report.warnings);
    assert_eq!(report.event.metadata["channel"], "web");
    assert_eq!(report.significant_fields(), vec!["sentiment"]);
    assert_eq!(report.recommendation.action, RecommendedAction::Act);

    let sentiment = report.field("sentiment").unwrap();
    assert_eq!(sentiment.test.n_before, 60);
    assert_eq!(sentiment.test.n_after, 60);
    let temporal = sentiment.temporal.as_ref().unwrap();
    assert!(temporal.weighted_impact > 3.0 && temporal.weighted_impact < 5.0);
}

#[test]
fn test_entity_scope_limits_samples() {
    let engine = engine();
    let options = ReportOptions {
        scope: EntityScope::entities(["acme"]),
        ..ReportOptions::minimal(["sentiment"])
    };
    let report = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    let sentiment = report.field("sentiment").unwrap();
    assert_eq!(sentiment.test.n_before, 30);
    assert_eq!(sentiment.test.n_after, 30);
}

#[test]
fn test_concurrent_requests_build_once() {
    let provider = CountingProvider {
        inner: JsonFileProvider::from_path(fixture()).unwrap(),
        fetches: AtomicUsize::new(0),
    };
    let engine = ImpactEngine::with_config(provider, fast_config()).unwrap();
    let options = ReportOptions::minimal(["sentiment", "volume"]);

    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| engine.generate_comprehensive_report("launch", &options)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });

    assert_eq!(engine.cache().builds(), 1);
    assert_eq!(engine.provider().fetches.load(Ordering::SeqCst), 2);
    for report in &reports[1..] {
        assert!(Arc::ptr_eq(&reports[0], report));
    }
}

#[test]
fn test_provider_errors_propagate() {
    let engine = ImpactEngine::with_config(OfflineProvider, fast_config()).unwrap();
    let err = engine
        .generate_comprehensive_report("launch", &ReportOptions::for_fields(["sentiment"]))
        .unwrap_err();
    assert_eq!(err, ImpactError::Provider("connection refused".to_string()));
    assert!(err.is_provider_error());
    assert!(engine.cache().is_empty());
}

#[test]
fn test_unknown_event_is_not_found() {
    let err = engine()
        .generate_comprehensive_report("recall", &ReportOptions::for_fields(["sentiment"]))
        .unwrap_err();
    assert!(matches!(err, ImpactError::NotFound { kind: "event", .. }));
}

#[test]
fn test_correction_method_override() {
    let engine = engine();
    let options = ReportOptions {
        correction_method: Some(eventshift::correction::CorrectionMethod::Bonferroni),
        ..ReportOptions::minimal(["sentiment", "volume"])
    };
    let report = engine
        .generate_comprehensive_report("launch", &options)
        .unwrap();
    let correction = report.correction.as_ref().unwrap();
    assert_eq!(
        correction.method,
        eventshift::correction::CorrectionMethod::Bonferroni
    );
    assert!((correction.corrected_alpha - 0.025).abs() < 1e-15);
}
