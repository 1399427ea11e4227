// Cross-field relationships around an event
//
// - correlation: pre/post correlation matrices over daily first-differences
// - dependency: Granger-style directed network with cycle reporting
// - composite: weighted aggregation of per-field impacts
//
// All three work on daily means; fields are aligned on the days where both
// have observations.

mod composite;
mod correlation;
mod dependency;

pub use composite::{
    composite_impact, AggregationMethod, CompositeImpact, FieldContribution, FieldImpact,
};
pub use correlation::{
    correlate, correlation_matrix, kendall_tau_b, pearson, spearman, Correlation,
    CorrelationChange, CorrelationMatrix, CorrelationMethod, FieldPairCorrelation,
    DEFAULT_CHANGE_THRESHOLD,
};
pub use dependency::{
    build_dependency_network, granger_test, DependencyEdge, DependencyNetwork, DependencyNode,
    EdgeSign, GrangerResult, NetworkOptions,
};

use crate::window::{days_from, TimedValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Daily means keyed by whole-day offset from `origin`
pub(crate) fn daily_means(series: &[TimedValue], origin: DateTime<Utc>) -> BTreeMap<i64, f64> {
    let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for point in series.iter().filter(|p| p.value.is_finite()) {
        let day = days_from(origin, point.timestamp).floor() as i64;
        let entry = buckets.entry(day).or_insert((0.0, 0));
        entry.0 += point.value;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(day, (sum, count))| (day, sum / count as f64))
        .collect()
}

/// Days present in both series, ascending, with both values
pub(crate) fn align(a: &BTreeMap<i64, f64>, b: &BTreeMap<i64, f64>) -> Vec<(i64, f64, f64)> {
    a.iter()
        .filter_map(|(day, va)| b.get(day).map(|vb| (*day, *va, *vb)))
        .collect()
}

#[cfg(test)]
mod tests;
