//! Engine-wide configuration
//!
//! Per-request choices live in `ReportOptions`; this holds the defaults the
//! engine applies to every analysis. Loadable from TOML, every field optional:
//!
//! ```toml
//! significance_level = 0.01
//! bootstrap_iterations = 2000
//! correction_method = "holm"
//! seed = 42
//! ```

use crate::confidence::CiOptions;
use crate::correction::CorrectionMethod;
use crate::cross_field::DEFAULT_CHANGE_THRESHOLD;
use crate::error::{ImpactError, Result};
use crate::hypothesis::TestOptions;
use crate::sampling::{ResampleControl, Resampler};
use crate::window::MIN_RELIABLE_SAMPLE;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Family-wise α (or target FDR) for tests and corrections
    pub significance_level: f64,

    /// Per-side sample size below which results carry a low-confidence warning
    pub min_reliable_sample: usize,

    pub bootstrap_iterations: usize,
    pub permutation_iterations: usize,
    pub posterior_draws: usize,

    /// Symmetric trim for the trimmed-mean interval
    pub trim_fraction: f64,

    /// Fixed seed for every resampling loop; entropy when absent
    pub seed: Option<u64>,

    /// Threads for chunked resampling; results do not depend on this
    pub worker_threads: usize,

    /// Resampling loops yield every N draws (0 never yields)
    pub yield_every: usize,

    pub correction_method: CorrectionMethod,

    /// |r| change needed before a correlation counts as strengthened/weakened
    pub change_threshold: f64,

    /// Finished reports kept before the least recently used is dropped
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_reliable_sample: MIN_RELIABLE_SAMPLE,
            bootstrap_iterations: 10_000,
            permutation_iterations: 10_000,
            posterior_draws: 10_000,
            trim_fraction: 0.2,
            seed: None,
            worker_threads: default_threads(),
            yield_every: 1024,
            correction_method: CorrectionMethod::BenjaminiHochberg,
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(1)
}

impl EngineConfig {
    /// Fewer false positives: α = 0.01, FWER control, larger samples expected
    pub fn strict() -> Self {
        Self {
            significance_level: 0.01,
            min_reliable_sample: 30,
            bootstrap_iterations: 20_000,
            permutation_iterations: 20_000,
            correction_method: CorrectionMethod::Holm,
            change_threshold: 0.3,
            ..Self::default()
        }
    }

    /// Earlier signals: α = 0.10, FDR control, cheaper resampling
    pub fn permissive() -> Self {
        Self {
            significance_level: 0.10,
            min_reliable_sample: 10,
            bootstrap_iterations: 2_000,
            permutation_iterations: 2_000,
            posterior_draws: 2_000,
            correction_method: CorrectionMethod::BenjaminiHochberg,
            change_threshold: 0.15,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(format!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            ));
        }
        if self.min_reliable_sample < 2 {
            return Err(format!(
                "min_reliable_sample must be >= 2, got {}",
                self.min_reliable_sample
            ));
        }
        for (name, value) in [
            ("bootstrap_iterations", self.bootstrap_iterations),
            ("posterior_draws", self.posterior_draws),
        ] {
            if value < 100 {
                return Err(format!("{} must be at least 100, got {}", name, value));
            }
        }
        if self.permutation_iterations == 0 {
            return Err("permutation_iterations must be at least 1".to_string());
        }
        if !(0.0..0.5).contains(&self.trim_fraction) {
            return Err(format!(
                "trim_fraction must be in [0, 0.5), got {}",
                self.trim_fraction
            ));
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be at least 1".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.change_threshold) {
            return Err(format!(
                "change_threshold must be in [0, 1], got {}",
                self.change_threshold
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ImpactError::Config(e.to_string()))?;
        config.validate().map_err(ImpactError::Config)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImpactError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn resample_control(&self) -> ResampleControl {
        ResampleControl {
            yield_every: self.yield_every,
            threads: self.worker_threads.max(1),
            ..ResampleControl::default()
        }
    }

    /// Resampler seeded from `seed`, or from entropy
    pub fn resampler(&self) -> Resampler {
        Resampler::from_seed_or_entropy(self.seed).with_control(self.resample_control())
    }

    pub fn test_options(&self) -> TestOptions {
        TestOptions {
            confidence_level: 1.0 - self.significance_level,
            permutation_iterations: self.permutation_iterations,
            min_reliable_sample: self.min_reliable_sample,
            ..TestOptions::default()
        }
    }

    pub fn ci_options(&self) -> CiOptions {
        CiOptions {
            confidence_level: 1.0 - self.significance_level,
            bootstrap_iterations: self.bootstrap_iterations,
            trim_fraction: self.trim_fraction,
        }
    }
}
