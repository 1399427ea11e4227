//! Data sources feeding the engine
//!
//! The engine only ever makes two calls: fetch a field's samples for an entity
//! scope and time range, and resolve an event id to its anchor. Both block.
//! `fetch_samples` returns an empty vector when nothing matches; an unknown
//! event is `ImpactError::NotFound`.
//!
//! # Data file format
//!
//! ```json
//! {
//!   "events":  [{ "event_id": "launch", "timestamp": "2024-06-01T00:00:00Z",
//!                 "metadata": { "channel": "web" } }],
//!   "samples": [{ "entity_id": "acme", "field_name": "sentiment",
//!                 "timestamp": "2024-05-30T09:00:00Z", "value": 0.72 }]
//! }
//! ```
//!
//! `eventId`, `entityId`, `field` and `fieldName` are accepted as aliases.

use crate::error::{ImpactError, Result};
use crate::window::{EntityScope, SamplePoint, TimeRange, TimedValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Event anchor as resolved by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnchor {
    #[serde(alias = "eventId")]
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EventAnchor {
    pub fn new(event_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            metadata: BTreeMap::new(),
        }
    }
}

/// External source of time series and event anchors
pub trait DataProvider: Send + Sync {
    /// Ordered samples of `field` for entities in `scope` within `range`
    fn fetch_samples(
        &self,
        scope: &EntityScope,
        field: &str,
        range: TimeRange,
    ) -> Result<Vec<TimedValue>>;

    fn get_event_anchor(&self, event_id: &str) -> Result<EventAnchor>;
}

/// Provider over samples held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    events: HashMap<String, EventAnchor>,
    samples: Vec<SamplePoint>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let anchor = EventAnchor::new(event_id, timestamp);
        self.events.insert(anchor.event_id.clone(), anchor);
        self
    }

    pub fn with_event_anchor(mut self, anchor: EventAnchor) -> Self {
        self.events.insert(anchor.event_id.clone(), anchor);
        self
    }

    pub fn with_sample(
        mut self,
        entity_id: impl Into<String>,
        field_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Self {
        self.samples.push(SamplePoint {
            entity_id: entity_id.into(),
            field_name: field_name.into(),
            timestamp,
            value,
        });
        self
    }

    pub fn with_series(
        mut self,
        entity_id: &str,
        field_name: &str,
        series: impl IntoIterator<Item = TimedValue>,
    ) -> Self {
        self.samples.extend(series.into_iter().map(|p| SamplePoint {
            entity_id: entity_id.to_string(),
            field_name: field_name.to_string(),
            timestamp: p.timestamp,
            value: p.value,
        }));
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Distinct field names, sorted
    pub fn fields(&self) -> Vec<String> {
        self.samples
            .iter()
            .map(|s| s.field_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl DataProvider for InMemoryProvider {
    fn fetch_samples(
        &self,
        scope: &EntityScope,
        field: &str,
        range: TimeRange,
    ) -> Result<Vec<TimedValue>> {
        let mut out: Vec<TimedValue> = self
            .samples
            .iter()
            .filter(|s| {
                s.field_name == field && scope.contains(&s.entity_id) && range.contains(s.timestamp)
            })
            .map(|s| TimedValue::new(s.timestamp, s.value))
            .collect();
        out.sort_by_key(|p| p.timestamp);
        Ok(out)
    }

    fn get_event_anchor(&self, event_id: &str) -> Result<EventAnchor> {
        self.events
            .get(event_id)
            .cloned()
            .ok_or_else(|| ImpactError::not_found("event", event_id))
    }
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    #[serde(alias = "entityId")]
    entity_id: String,
    #[serde(alias = "fieldName", alias = "field")]
    field_name: String,
    timestamp: DateTime<Utc>,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct DataFile {
    #[serde(default)]
    events: Vec<EventAnchor>,
    #[serde(default)]
    samples: Vec<SampleRecord>,
}

/// Provider backed by a JSON data file, loaded once
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    inner: InMemoryProvider,
}

impl JsonFileProvider {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImpactError::Provider(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: DataFile = serde_json::from_str(text)
            .map_err(|e| ImpactError::Provider(format!("invalid data file: {}", e)))?;
        let mut inner = InMemoryProvider::new();
        for event in file.events {
            inner = inner.with_event_anchor(event);
        }
        for s in file.samples {
            inner = inner.with_sample(s.entity_id, s.field_name, s.timestamp, s.value);
        }
        tracing::debug!(
            events = inner.events.len(),
            samples = inner.samples.len(),
            "data file loaded"
        );
        Ok(Self { inner })
    }

    pub fn fields(&self) -> Vec<String> {
        self.inner.fields()
    }
}

impl DataProvider for JsonFileProvider {
    fn fetch_samples(
        &self,
        scope: &EntityScope,
        field: &str,
        range: TimeRange,
    ) -> Result<Vec<TimedValue>> {
        self.inner.fetch_samples(scope, field, range)
    }

    fn get_event_anchor(&self, event_id: &str) -> Result<EventAnchor> {
        self.inner.get_event_anchor(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn range(from_days: i64, to_days: i64) -> TimeRange {
        TimeRange {
            start: t0() + Duration::days(from_days),
            end: t0() + Duration::days(to_days),
        }
    }

    #[test]
    fn test_fetch_filters_scope_field_and_range() {
        let provider = InMemoryProvider::new()
            .with_sample("acme", "nps", t0() + Duration::days(2), 3.0)
            .with_sample("acme", "nps", t0(), 1.0)
            .with_sample("globex", "nps", t0() + Duration::days(1), 2.0)
            .with_sample("acme", "csat", t0(), 9.0)
            .with_sample("acme", "nps", t0() + Duration::days(10), 4.0);

        let all = provider
            .fetch_samples(&EntityScope::all(), "nps", range(0, 5))
            .unwrap();
        let values: Vec<f64> = all.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);

        let acme = provider
            .fetch_samples(&EntityScope::entities(["acme"]), "nps", range(0, 5))
            .unwrap();
        assert_eq!(acme.len(), 2);

        assert_eq!(provider.fields(), vec!["csat".to_string(), "nps".to_string()]);
    }

    #[test]
    fn test_missing_data_is_empty_not_error() {
        let provider = InMemoryProvider::new();
        let samples = provider
            .fetch_samples(&EntityScope::all(), "nps", range(0, 5))
            .unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_unknown_event_is_not_found() {
        let provider = InMemoryProvider::new().with_event("launch", t0());
        assert_eq!(provider.get_event_anchor("launch").unwrap().timestamp, t0());
        assert!(matches!(
            provider.get_event_anchor("recall"),
            Err(ImpactError::NotFound { kind: "event", .. })
        ));
    }

    #[test]
    fn test_json_provider_accepts_aliases() {
        let json = r#"{
            "events": [{"eventId": "launch", "timestamp": "2024-06-01T00:00:00Z",
                        "metadata": {"channel": "web"}}],
            "samples": [
                {"entityId": "acme", "field": "nps", "timestamp": "2024-05-31T12:00:00Z", "value": 7.5},
                {"entity_id": "acme", "field_name": "nps", "timestamp": "2024-06-01T12:00:00Z", "value": 8.0}
            ]
        }"#;
        let provider = JsonFileProvider::from_json_str(json).unwrap();
        let anchor = provider.get_event_anchor("launch").unwrap();
        assert_eq!(anchor.metadata["channel"], "web");
        let samples = provider
            .fetch_samples(&EntityScope::all(), "nps", range(-1, 1))
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(provider.fields(), vec!["nps".to_string()]);
    }

    #[test]
    fn test_json_provider_errors_are_provider_errors() {
        let err = JsonFileProvider::from_json_str("{ not json").unwrap_err();
        assert!(err.is_provider_error());
        let err = JsonFileProvider::from_path("/nonexistent/eventshift.json").unwrap_err();
        assert!(matches!(err, ImpactError::Provider(_)));
    }
}
