// Provider-backed engine composing every analysis into one report
//
// Mandatory component: the before/after test per field. Optional components
// (effect sizes, power, intervals, Bayesian, temporal, cross-field) run
// through `ComponentLog::record`, which turns a failure into a warning and
// marks the report partial instead of aborting it.

use super::recommendation::recommend;
use super::{
    analysis_id, ComprehensiveImpactReport, CrossFieldAnalysis, CrossFieldOptions,
    FieldAnalysis, ReportCache, ReportOptions, ReportStatus, StatusTracker,
};
use crate::bayesian;
use crate::config::EngineConfig;
use crate::confidence::compute_confidence_intervals;
use crate::correction::{correct_for_multiple_comparisons, CorrectionResult};
use crate::cross_field::{
    self, composite_impact, correlation_matrix, CorrelationMatrix, CorrelationMethod,
    DependencyNetwork, FieldImpact, NetworkOptions,
};
use crate::effect_size::{cohens_d, compute_effect_sizes, EffectSizeOptions};
use crate::error::{ImpactError, Result};
use crate::hypothesis::{run_test, TestKind, TestOptions, TestResult};
use crate::power::{analyze_power, PowerSpec};
use crate::provider::{DataProvider, EventAnchor};
use crate::sampling::Resampler;
use crate::temporal::{analyze_series, TemporalSpec, WeightedImpactResult};
use crate::window::{EntityScope, TimeRange, TimedValue, WindowSpec, MIN_TEST_SAMPLE};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collects optional-component failures as warnings
#[derive(Debug, Default)]
struct ComponentLog {
    failed: Vec<String>,
    warnings: Vec<String>,
}

impl ComponentLog {
    fn record<T>(&mut self, component: &str, subject: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(component, subject, error = %e, "report component failed");
                self.failed.push(component.to_string());
                self.warnings
                    .push(format!("{} failed for {}: {}", component, subject, e));
                None
            }
        }
    }
}

pub struct ImpactEngine<P: DataProvider> {
    provider: P,
    config: EngineConfig,
    cache: ReportCache,
    /// Bumped on invalidation so rebuilt reports get fresh analysis ids
    generation: AtomicU64,
}

impl<P: DataProvider> ImpactEngine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: EngineConfig::default(),
            cache: ReportCache::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_config(provider: P, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(ImpactError::Config)?;
        Ok(Self {
            cache: ReportCache::with_capacity(config.cache_capacity),
            config,
            ..Self::new(provider)
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Forget cached reports, e.g. after the provider's data changed
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
        tracing::info!("report cache invalidated");
    }

    fn resampler(&self, seed: Option<u64>) -> Resampler {
        Resampler::from_seed_or_entropy(seed.or(self.config.seed))
            .with_control(self.config.resample_control())
    }

    fn fetch_fields(
        &self,
        scope: &EntityScope,
        fields: &[String],
        range: TimeRange,
    ) -> Result<BTreeMap<String, Vec<TimedValue>>> {
        let mut out = BTreeMap::new();
        for field in fields {
            let series = self.provider.fetch_samples(scope, field, range)?;
            tracing::debug!(field = %field, samples = series.len(), "fetched samples");
            out.insert(field.clone(), series);
        }
        Ok(out)
    }

    /// Before/after test of one field around an event
    pub fn run_hypothesis_test(
        &self,
        event_id: &str,
        scope: &EntityScope,
        field: &str,
        window: &WindowSpec,
        kind: TestKind,
        options: &TestOptions,
    ) -> Result<TestResult> {
        window.validate().map_err(ImpactError::Validation)?;
        options.validate().map_err(ImpactError::Validation)?;
        let anchor = self.provider.get_event_anchor(event_id)?;
        let series = self
            .provider
            .fetch_samples(scope, field, window.range(anchor.timestamp))?;
        let pair = window.partition(anchor.timestamp, &series);
        let mut resampler = self.resampler(None);
        Ok(run_test(
            &pair.before.values(),
            &pair.after.values(),
            kind,
            options,
            &mut resampler,
        ))
    }

    pub fn analyze_temporal_dynamics(
        &self,
        event_id: &str,
        scope: &EntityScope,
        field: &str,
        spec: &TemporalSpec,
    ) -> Result<WeightedImpactResult> {
        spec.validate().map_err(ImpactError::Validation)?;
        let anchor = self.provider.get_event_anchor(event_id)?;
        let series = self
            .provider
            .fetch_samples(scope, field, spec.window.range(anchor.timestamp))?;
        analyze_series(&series, anchor.timestamp, spec)
    }

    pub fn analyze_correlations(
        &self,
        event_id: &str,
        scope: &EntityScope,
        fields: &[String],
        window: &WindowSpec,
        method: CorrelationMethod,
    ) -> Result<CorrelationMatrix> {
        window.validate().map_err(ImpactError::Validation)?;
        let anchor = self.provider.get_event_anchor(event_id)?;
        let series = self.fetch_fields(scope, fields, window.range(anchor.timestamp))?;
        correlation_matrix(
            &series,
            anchor.timestamp,
            method,
            self.config.change_threshold,
        )
    }

    pub fn build_dependency_network(
        &self,
        event_id: &str,
        scope: &EntityScope,
        fields: &[String],
        window: &WindowSpec,
        options: &NetworkOptions,
    ) -> Result<DependencyNetwork> {
        window.validate().map_err(ImpactError::Validation)?;
        let anchor = self.provider.get_event_anchor(event_id)?;
        let series = self.fetch_fields(scope, fields, window.range(anchor.timestamp))?;
        cross_field::build_dependency_network(&series, options)
    }

    /// Full report for `event_id`, built at most once per normalized options
    ///
    /// Unknown events and provider failures propagate as errors; everything
    /// downstream of data retrieval degrades into warnings and report status.
    pub fn generate_comprehensive_report(
        &self,
        event_id: &str,
        options: &ReportOptions,
    ) -> Result<Arc<ComprehensiveImpactReport>> {
        options.validate().map_err(ImpactError::Validation)?;
        let normalized = options.normalized();
        let hash = normalized.options_hash()?;
        self.cache.get_or_build((event_id.to_string(), hash), || {
            self.build_report(event_id, normalized, hash)
        })
    }

    fn build_report(
        &self,
        event_id: &str,
        options: ReportOptions,
        hash: u64,
    ) -> Result<ComprehensiveImpactReport> {
        let mut status = StatusTracker::new();
        status.advance(ReportStatus::Computing)?;
        tracing::info!(event = event_id, fields = options.fields.len(), "building impact report");

        let anchor = self.provider.get_event_anchor(event_id)?;
        let series = self.fetch_fields(
            &options.scope,
            &options.fields,
            options.window.range(anchor.timestamp),
        )?;

        let test_options = TestOptions {
            assume_equal_variance: options.assume_equal_variance,
            validate_assumptions: options.validate_assumptions,
            ..self.config.test_options()
        };
        let mut root = self.resampler(options.seed);
        let mut report_log = ComponentLog::default();

        let mut fields: Vec<FieldAnalysis> = Vec::with_capacity(options.fields.len());
        for field in &options.fields {
            let mut resampler = root.fork();
            let data = series.get(field).map(Vec::as_slice).unwrap_or_default();
            fields.push(self.analyze_field(
                field,
                data,
                &anchor,
                &options,
                &test_options,
                &mut resampler,
            ));
        }

        let correction = self.apply_correction(&mut fields, &options, &mut report_log);

        let testable: BTreeMap<String, Vec<TimedValue>> = fields
            .iter()
            .filter(|f| f.testable)
            .filter_map(|f| series.get(&f.field).map(|s| (f.field.clone(), s.clone())))
            .collect();
        let cross_field = match &options.cross_field {
            Some(cross) if testable.len() >= 2 => Some(self.analyze_cross_field(
                cross,
                &testable,
                &anchor,
                &fields,
                &mut report_log,
            )),
            _ => None,
        };

        let testable_count = fields.iter().filter(|f| f.testable).count();
        let any_component_failed =
            !report_log.failed.is_empty() || fields.iter().any(|f| !f.failed_components.is_empty());
        let final_status = if testable_count == 0 {
            ReportStatus::Failed
        } else if any_component_failed || testable_count < fields.len() {
            ReportStatus::Partial
        } else {
            ReportStatus::Complete
        };
        status.advance(final_status)?;

        let mut warnings = report_log.warnings;
        for field in fields.iter().filter(|f| !f.testable) {
            warnings.push(format!(
                "'{}' has too few observations (before={}, after={}); only a degraded test was produced",
                field.field, field.test.n_before, field.test.n_after
            ));
        }

        let recommendation = recommend(&fields, cross_field.as_ref(), final_status);
        let generation = self.generation.load(Ordering::SeqCst);

        tracing::info!(
            event = event_id,
            status = %final_status,
            warnings = warnings.len(),
            "impact report built"
        );

        Ok(ComprehensiveImpactReport {
            analysis_id: analysis_id(event_id, hash, generation),
            event: anchor,
            options_hash: format!("{:016x}", hash),
            options,
            status: final_status,
            status_history: status.into_history(),
            generated_at: Utc::now(),
            fields,
            correction,
            cross_field,
            recommendation,
            warnings,
        })
    }

    fn analyze_field(
        &self,
        field: &str,
        series: &[TimedValue],
        anchor: &EventAnchor,
        options: &ReportOptions,
        test_options: &TestOptions,
        resampler: &mut Resampler,
    ) -> FieldAnalysis {
        let pair = options.window.partition(anchor.timestamp, series);
        let before = pair.before.values();
        let after = pair.after.values();
        let test = run_test(&before, &after, options.test_kind, test_options, resampler);
        let testable = before.len() >= MIN_TEST_SAMPLE && after.len() >= MIN_TEST_SAMPLE;

        let mut analysis = FieldAnalysis {
            field: field.to_string(),
            significant_after_correction: false,
            adjusted_p_value: None,
            testable,
            test,
            effect_sizes: None,
            power: None,
            confidence_intervals: None,
            bayesian: None,
            temporal: None,
            failed_components: Vec::new(),
            warnings: Vec::new(),
        };
        if !testable {
            return analysis;
        }

        let mut log = ComponentLog::default();
        let alpha = self.config.significance_level;

        if options.effect_sizes {
            let bundle = compute_effect_sizes(
                &before,
                &after,
                &EffectSizeOptions {
                    confidence_level: 1.0 - alpha,
                },
            );
            analysis.warnings.extend(bundle.warnings.iter().cloned());
            analysis.effect_sizes = Some(bundle);
        }

        if options.power {
            let d = cohens_d(&before, &after).abs();
            if d > 1e-12 {
                let n = before.len().min(after.len());
                analysis.power = log.record(
                    "power analysis",
                    field,
                    analyze_power(&PowerSpec::achieved_power(d, alpha, n)),
                );
            } else {
                analysis
                    .warnings
                    .push("Power analysis skipped: observed effect is zero".to_string());
            }
        }

        if !options.confidence_methods.is_empty() {
            analysis.confidence_intervals = log.record(
                "confidence intervals",
                field,
                compute_confidence_intervals(
                    &before,
                    &after,
                    &options.confidence_methods,
                    &self.config.ci_options(),
                    resampler,
                ),
            );
        }

        if let Some(prior) = &options.bayesian {
            let prior = bayesian::BayesianPrior {
                monte_carlo_draws: prior.monte_carlo_draws.min(self.config.posterior_draws),
                ..prior.clone()
            };
            analysis.bayesian = log.record(
                "bayesian analysis",
                field,
                bayesian::analyze(&before, &after, &prior, resampler),
            );
        }

        if let Some(spec) = &options.temporal {
            let spec = TemporalSpec {
                window: options.window,
                ..spec.clone()
            };
            analysis.temporal = log.record(
                "temporal analysis",
                field,
                analyze_series(series, anchor.timestamp, &spec),
            );
        }

        analysis.failed_components = log.failed;
        analysis.warnings.extend(log.warnings);
        analysis
    }

    fn apply_correction(
        &self,
        fields: &mut [FieldAnalysis],
        options: &ReportOptions,
        log: &mut ComponentLog,
    ) -> Option<CorrectionResult> {
        let indices: Vec<usize> = (0..fields.len()).filter(|&i| fields[i].testable).collect();
        if indices.is_empty() {
            return None;
        }
        let p_values: Vec<f64> = indices.iter().map(|&i| fields[i].test.p_value).collect();
        let method = options
            .correction_method
            .unwrap_or(self.config.correction_method);
        let correction = log.record(
            "multiple comparison correction",
            "all fields",
            correct_for_multiple_comparisons(&p_values, method, self.config.significance_level),
        );

        for (rank, &i) in indices.iter().enumerate() {
            match &correction {
                Some(c) => {
                    fields[i].adjusted_p_value = Some(c.adjusted_p_values[rank]);
                    fields[i].significant_after_correction = c.is_rejected(rank);
                }
                None => fields[i].significant_after_correction = fields[i].test.is_significant,
            }
        }
        correction
    }

    fn analyze_cross_field(
        &self,
        cross: &CrossFieldOptions,
        series: &BTreeMap<String, Vec<TimedValue>>,
        anchor: &EventAnchor,
        fields: &[FieldAnalysis],
        log: &mut ComponentLog,
    ) -> CrossFieldAnalysis {
        let correlations = log.record(
            "correlation matrix",
            "all fields",
            correlation_matrix(
                series,
                anchor.timestamp,
                cross.correlation_method,
                self.config.change_threshold,
            ),
        );
        let network = log.record(
            "dependency network",
            "all fields",
            cross_field::build_dependency_network(series, &cross.network),
        );

        let impacts: Vec<FieldImpact> = fields
            .iter()
            .filter(|f| f.testable)
            .map(|f| {
                let weight = cross.field_weights.get(&f.field).copied().unwrap_or(1.0);
                FieldImpact::new(f.field.clone(), f.standardized_impact(), weight)
            })
            .collect();
        let composite = log.record(
            "composite impact",
            "all fields",
            composite_impact(&impacts, cross.aggregation),
        );

        CrossFieldAnalysis {
            correlations,
            network,
            composite,
        }
    }
}
