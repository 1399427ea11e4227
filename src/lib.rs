//! Eventshift - statistical impact analysis of discrete events on time series
//!
//! Given an event anchor and per-entity metric series, the engine splits each
//! field into before/after windows and answers whether the event shifted the
//! metric: two-sample tests, effect sizes, multiple-comparison correction,
//! power, confidence intervals, a Bayesian posterior, temporal dynamics and
//! cross-field relationships, composed into one cached report per request.

pub mod bayesian;
pub mod cli;
pub mod config;
pub mod confidence;
pub mod correction;
pub mod cross_field;
pub mod descriptive;
pub mod dist;
pub mod effect_size;
pub mod error;
pub mod hypothesis;
pub mod power;
pub mod provider;
pub mod report;
pub mod sampling;
pub mod temporal;
pub mod window;

pub use error::{ImpactError, Result};
pub use provider::{DataProvider, EventAnchor, InMemoryProvider, JsonFileProvider};
pub use report::{ComprehensiveImpactReport, ImpactEngine, ReportOptions, ReportStatus};
