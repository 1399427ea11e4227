// Comprehensive impact reports
//
// One report per (event, normalized options). Reports are immutable once
// built and shared as `Arc`; asking again with different options yields a new
// report with a new analysis id.
//
// Lifecycle: pending -> computing -> complete | partial | failed
// - complete: every requested component succeeded
// - partial:  the per-field impact tests ran, some optional component failed
//             (its error is recorded as a warning)
// - failed:   no field had enough data on both sides of the anchor

mod cache;
mod orchestrator;
mod recommendation;
mod render;

pub use cache::{CacheKey, ReportCache};
pub use orchestrator::ImpactEngine;
pub use recommendation::{Recommendation, RecommendedAction};

use crate::bayesian::{BayesianPrior, BayesianResult};
use crate::confidence::{CiBundle, CiMethod};
use crate::correction::{CorrectionMethod, CorrectionResult};
use crate::cross_field::{
    AggregationMethod, CompositeImpact, CorrelationMatrix, CorrelationMethod, DependencyNetwork,
    NetworkOptions,
};
use crate::effect_size::EffectSizeBundle;
use crate::error::{ImpactError, Result};
use crate::hypothesis::{TestKind, TestResult};
use crate::power::PowerResult;
use crate::provider::EventAnchor;
use crate::temporal::{TemporalSpec, WeightedImpactResult};
use crate::window::{EntityScope, WindowSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Computing,
    Complete,
    Partial,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Computing => "computing",
            ReportStatus::Complete => "complete",
            ReportStatus::Partial => "partial",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Complete | ReportStatus::Partial | ReportStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Pending, ReportStatus::Computing)
                | (ReportStatus::Computing, ReportStatus::Complete)
                | (ReportStatus::Computing, ReportStatus::Partial)
                | (ReportStatus::Computing, ReportStatus::Failed)
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status with its transition history
#[derive(Debug, Clone)]
pub(crate) struct StatusTracker {
    history: Vec<ReportStatus>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        Self {
            history: vec![ReportStatus::Pending],
        }
    }

    pub(crate) fn current(&self) -> ReportStatus {
        self.history
            .last()
            .copied()
            .unwrap_or(ReportStatus::Pending)
    }

    pub(crate) fn advance(&mut self, next: ReportStatus) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(ImpactError::Computation(format!(
                "invalid report transition {} -> {}",
                current, next
            )));
        }
        self.history.push(next);
        Ok(())
    }

    pub(crate) fn into_history(self) -> Vec<ReportStatus> {
        self.history
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossFieldOptions {
    pub correlation_method: CorrelationMethod,
    pub network: NetworkOptions,
    pub aggregation: AggregationMethod,
    /// Composite weights; unlisted fields weigh 1
    pub field_weights: BTreeMap<String, f64>,
}

impl Default for CrossFieldOptions {
    fn default() -> Self {
        Self {
            correlation_method: CorrelationMethod::Pearson,
            network: NetworkOptions::default(),
            aggregation: AggregationMethod::WeightedMean,
            field_weights: BTreeMap::new(),
        }
    }
}

/// What a report request asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub fields: Vec<String>,
    pub scope: EntityScope,
    pub window: WindowSpec,
    pub test_kind: TestKind,
    pub assume_equal_variance: Option<bool>,
    pub validate_assumptions: bool,
    pub effect_sizes: bool,
    pub power: bool,
    pub confidence_methods: Vec<CiMethod>,
    pub bayesian: Option<BayesianPrior>,
    pub temporal: Option<TemporalSpec>,
    pub cross_field: Option<CrossFieldOptions>,
    /// Overrides the engine's correction method
    pub correction_method: Option<CorrectionMethod>,
    /// Overrides the engine's seed
    pub seed: Option<u64>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            scope: EntityScope::all(),
            window: WindowSpec::default(),
            test_kind: TestKind::WelchT,
            assume_equal_variance: None,
            validate_assumptions: true,
            effect_sizes: true,
            power: true,
            confidence_methods: vec![CiMethod::Parametric, CiMethod::Bootstrap],
            bayesian: Some(BayesianPrior::default()),
            temporal: Some(TemporalSpec::default()),
            cross_field: Some(CrossFieldOptions::default()),
            correction_method: None,
            seed: None,
        }
    }
}

impl ReportOptions {
    pub fn for_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Only the mandatory tests; every optional component off
    pub fn minimal<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect_sizes: false,
            power: false,
            confidence_methods: Vec::new(),
            bayesian: None,
            temporal: None,
            cross_field: None,
            validate_assumptions: false,
            ..Self::for_fields(fields)
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.fields.is_empty() {
            return Err("at least one field is required".to_string());
        }
        if let Some(empty) = self.fields.iter().find(|f| f.trim().is_empty()) {
            return Err(format!("field names must not be blank, got {:?}", empty));
        }
        self.window.validate()?;
        if let Some(prior) = &self.bayesian {
            prior.validate()?;
        }
        if let Some(temporal) = &self.temporal {
            temporal.validate()?;
        }
        if let Some(cross) = &self.cross_field {
            cross.network.validate()?;
            if let Some((field, w)) = cross
                .field_weights
                .iter()
                .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
            {
                return Err(format!("weight for '{}' must be non-negative, got {}", field, w));
            }
        }
        Ok(())
    }

    /// Canonical form: field and method lists sorted and deduplicated
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.fields.sort();
        out.fields.dedup();
        out.confidence_methods.sort();
        out.confidence_methods.dedup();
        out.scope.entity_ids.sort();
        out.scope.entity_ids.dedup();
        out
    }

    /// FNV-1a hash of the normalized options' canonical JSON
    pub fn options_hash(&self) -> Result<u64> {
        let canonical = serde_json::to_vec(&self.normalized())
            .map_err(|e| ImpactError::Validation(format!("options are not serializable: {}", e)))?;
        let mut hasher = fnv::FnvHasher::default();
        hasher.write(&canonical);
        Ok(hasher.finish())
    }
}

/// Stable id for one build of one report
pub fn analysis_id(event_id: &str, options_hash: u64, generation: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(options_hash.to_be_bytes());
    hasher.update(generation.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Everything computed for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldAnalysis {
    pub field: String,
    pub test: TestResult,
    /// Before/after window had at least two observations each
    pub testable: bool,
    pub adjusted_p_value: Option<f64>,
    pub significant_after_correction: bool,
    pub effect_sizes: Option<EffectSizeBundle>,
    pub power: Option<PowerResult>,
    pub confidence_intervals: Option<CiBundle>,
    pub bayesian: Option<BayesianResult>,
    pub temporal: Option<WeightedImpactResult>,
    pub failed_components: Vec<String>,
    pub warnings: Vec<String>,
}

impl FieldAnalysis {
    /// Standardized impact: Cohen's d when computed, else the test's effect size
    pub fn standardized_impact(&self) -> f64 {
        self.effect_sizes
            .as_ref()
            .map(|e| e.cohens_d.value)
            .unwrap_or(self.test.effect_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossFieldAnalysis {
    pub correlations: Option<CorrelationMatrix>,
    pub network: Option<DependencyNetwork>,
    pub composite: Option<CompositeImpact>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveImpactReport {
    pub analysis_id: String,
    pub event: EventAnchor,
    /// Hex FNV hash of the normalized options
    pub options_hash: String,
    pub options: ReportOptions,
    pub status: ReportStatus,
    pub status_history: Vec<ReportStatus>,
    pub generated_at: DateTime<Utc>,
    pub fields: Vec<FieldAnalysis>,
    pub correction: Option<CorrectionResult>,
    pub cross_field: Option<CrossFieldAnalysis>,
    pub recommendation: Recommendation,
    pub warnings: Vec<String>,
}

impl ComprehensiveImpactReport {
    pub fn field(&self, name: &str) -> Option<&FieldAnalysis> {
        self.fields.iter().find(|f| f.field == name)
    }

    pub fn is_partial(&self) -> bool {
        self.status == ReportStatus::Partial
    }

    pub fn significant_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.significant_after_correction)
            .map(|f| f.field.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests;
