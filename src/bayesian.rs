//! Conjugate normal-normal inference on the before/after shift
//!
//! The observed shift (mean difference or Cohen's d, depending on the prior
//! scale) is treated as a normal likelihood with its standard error. The
//! posterior is closed form; Monte-Carlo draws from it are still taken so
//! that the usual sampler diagnostics (effective sample size, split-chain
//! R-hat, Monte-Carlo error) are available to callers.

use crate::descriptive::{mean, variance};
use crate::dist::{normal_cdf, z_critical};
use crate::effect_size::cohens_d;
use crate::error::{ImpactError, Result};
use crate::sampling::{standard_normal, Resampler};
use crate::window::MIN_TEST_SAMPLE;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Chains used for split R-hat
const SPLIT_CHAINS: usize = 4;

/// R-hat below which the draws count as converged
const R_HAT_THRESHOLD: f64 = 1.01;

/// Bounds for the reported log Bayes factor (keeps the factor finite)
const MAX_LOG_BF: f64 = 700.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorScale {
    /// Prior on the raw mean difference (metric units)
    MeanDifference,
    /// Prior on the standardized effect (Cohen's d)
    EffectSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianPrior {
    pub scale: PriorScale,
    pub mean: f64,
    pub sd: f64,
    pub credible_level: f64,
    /// Half-width of the region of practical equivalence around zero
    pub rope_half_width: f64,
    pub monte_carlo_draws: usize,
}

impl Default for BayesianPrior {
    fn default() -> Self {
        Self {
            scale: PriorScale::EffectSize,
            mean: 0.0,
            sd: 1.0,
            credible_level: 0.95,
            rope_half_width: 0.1,
            monte_carlo_draws: 10_000,
        }
    }
}

impl BayesianPrior {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.sd.is_finite() && self.sd > 0.0) {
            return Err(format!("prior sd must be positive, got {}", self.sd));
        }
        if !self.mean.is_finite() {
            return Err("prior mean must be finite".to_string());
        }
        if !(self.credible_level > 0.0 && self.credible_level < 1.0) {
            return Err(format!(
                "credible_level must be in (0, 1), got {}",
                self.credible_level
            ));
        }
        if self.rope_half_width < 0.0 {
            return Err("rope_half_width must be non-negative".to_string());
        }
        if self.monte_carlo_draws < 100 {
            return Err(format!(
                "monte_carlo_draws must be at least 100, got {}",
                self.monte_carlo_draws
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hypothesis {
    Alternative,
    Null,
}

/// Jeffreys-style evidence categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    Anecdotal,
    Moderate,
    Strong,
    VeryStrong,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub favors: Hypothesis,
    pub strength: EvidenceStrength,
}

impl Evidence {
    pub fn from_bayes_factor(bf10: f64) -> Self {
        let (favors, ratio) = if bf10 >= 1.0 {
            (Hypothesis::Alternative, bf10)
        } else {
            (Hypothesis::Null, 1.0 / bf10.max(f64::MIN_POSITIVE))
        };
        let strength = if ratio < 3.0 {
            EvidenceStrength::Anecdotal
        } else if ratio < 10.0 {
            EvidenceStrength::Moderate
        } else if ratio < 30.0 {
            EvidenceStrength::Strong
        } else if ratio < 100.0 {
            EvidenceStrength::VeryStrong
        } else {
            EvidenceStrength::Extreme
        };
        Self { favors, strength }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerDiagnostics {
    pub method: String,
    pub draws: usize,
    pub effective_sample_size: f64,
    pub r_hat: f64,
    pub converged: bool,
    pub monte_carlo_mean: f64,
    pub monte_carlo_se: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianResult {
    pub scale: PriorScale,
    pub prior_mean: f64,
    pub prior_sd: f64,
    pub observed: f64,
    pub observed_se: f64,
    pub posterior_mean: f64,
    pub posterior_sd: f64,
    pub credible_lower: f64,
    pub credible_upper: f64,
    pub credible_level: f64,
    pub bayes_factor_10: f64,
    pub log_bayes_factor_10: f64,
    pub evidence: Evidence,
    /// Posterior probability that the shift is positive
    pub probability_positive: f64,
    pub probability_in_rope: f64,
    pub diagnostics: SamplerDiagnostics,
    pub warnings: Vec<String>,
}

fn log_normal_pdf(x: f64, mu: f64, sd: f64) -> f64 {
    let z = (x - mu) / sd;
    -0.5 * z * z - sd.ln() - 0.5 * (2.0 * PI).ln()
}

/// Observed shift and its standard error on the prior's scale
fn likelihood(before: &[f64], after: &[f64], scale: PriorScale) -> (f64, f64) {
    let (n1, n2) = (before.len() as f64, after.len() as f64);
    match scale {
        PriorScale::MeanDifference => {
            let se = (variance(before) / n1 + variance(after) / n2).sqrt();
            (mean(after) - mean(before), se)
        }
        PriorScale::EffectSize => {
            let d = cohens_d(before, after);
            let se = ((n1 + n2) / (n1 * n2) + d * d / (2.0 * (n1 + n2))).sqrt();
            (d, se)
        }
    }
}

/// Posterior over the shift given a conjugate normal prior
pub fn analyze(
    before: &[f64],
    after: &[f64],
    prior: &BayesianPrior,
    resampler: &mut Resampler,
) -> Result<BayesianResult> {
    prior.validate().map_err(ImpactError::Validation)?;
    let smallest = before.len().min(after.len());
    if smallest < MIN_TEST_SAMPLE {
        return Err(ImpactError::InsufficientData {
            required: MIN_TEST_SAMPLE,
            actual: smallest,
        });
    }

    let mut warnings = Vec::new();
    let (observed, observed_se) = likelihood(before, after, prior.scale);
    if !(observed_se.is_finite() && observed_se > f64::EPSILON) {
        return Err(ImpactError::Computation(
            "observed shift has zero standard error; posterior is degenerate".to_string(),
        ));
    }

    let prior_precision = 1.0 / (prior.sd * prior.sd);
    let data_precision = 1.0 / (observed_se * observed_se);
    let posterior_var = 1.0 / (prior_precision + data_precision);
    let posterior_mean = posterior_var * (prior.mean * prior_precision + observed * data_precision);
    let posterior_sd = posterior_var.sqrt();

    let z = z_critical(prior.credible_level);
    let marginal_sd = (prior.sd * prior.sd + observed_se * observed_se).sqrt();
    let log_bf = (log_normal_pdf(observed, prior.mean, marginal_sd)
        - log_normal_pdf(observed, 0.0, observed_se))
    .clamp(-MAX_LOG_BF, MAX_LOG_BF);
    let bayes_factor_10 = log_bf.exp();

    let w = prior.rope_half_width;
    let probability_in_rope =
        normal_cdf((w - posterior_mean) / posterior_sd) - normal_cdf((-w - posterior_mean) / posterior_sd);

    let draws = resampler.run(prior.monte_carlo_draws, |rng| {
        posterior_mean + posterior_sd * standard_normal(rng)
    })?;
    let diagnostics = diagnose(&draws);
    if !diagnostics.converged {
        warnings.push(format!(
            "Posterior draws did not pass the R-hat check (r_hat = {:.4})",
            diagnostics.r_hat
        ));
    }
    if smallest < crate::window::MIN_RELIABLE_SAMPLE {
        warnings.push(format!(
            "Normal likelihood approximation with only {} observations in the smaller window",
            smallest
        ));
    }

    Ok(BayesianResult {
        scale: prior.scale,
        prior_mean: prior.mean,
        prior_sd: prior.sd,
        observed,
        observed_se,
        posterior_mean,
        posterior_sd,
        credible_lower: posterior_mean - z * posterior_sd,
        credible_upper: posterior_mean + z * posterior_sd,
        credible_level: prior.credible_level,
        bayes_factor_10,
        log_bayes_factor_10: log_bf,
        evidence: Evidence::from_bayes_factor(bayes_factor_10),
        probability_positive: normal_cdf(posterior_mean / posterior_sd),
        probability_in_rope: probability_in_rope.clamp(0.0, 1.0),
        diagnostics,
        warnings,
    })
}

fn diagnose(draws: &[f64]) -> SamplerDiagnostics {
    let n = draws.len();
    let monte_carlo_mean = mean(draws);
    let ess = effective_sample_size(draws);
    let sd = variance(draws).sqrt();
    let r_hat = split_r_hat(draws, SPLIT_CHAINS);
    SamplerDiagnostics {
        method: "closed_form_conjugate".to_string(),
        draws: n,
        effective_sample_size: ess,
        r_hat,
        converged: r_hat < R_HAT_THRESHOLD,
        monte_carlo_mean,
        monte_carlo_se: if ess > 0.0 { sd / ess.sqrt() } else { 0.0 },
    }
}

/// ESS from the lag-1 autocorrelation: n·(1-ρ)/(1+ρ), capped at n
pub fn effective_sample_size(draws: &[f64]) -> f64 {
    let n = draws.len();
    if n < 3 {
        return n as f64;
    }
    let m = mean(draws);
    let denom: f64 = draws.iter().map(|x| (x - m) * (x - m)).sum();
    if denom <= 0.0 {
        return n as f64;
    }
    let num: f64 = draws.windows(2).map(|w| (w[0] - m) * (w[1] - m)).sum();
    let rho = (num / denom).clamp(-0.99, 0.99);
    (n as f64 * (1.0 - rho) / (1.0 + rho)).min(n as f64)
}

/// Gelman-Rubin statistic over `chains` contiguous splits of the draws
pub fn split_r_hat(draws: &[f64], chains: usize) -> f64 {
    let len = draws.len() / chains.max(1);
    if chains < 2 || len < 2 {
        return 1.0;
    }
    let splits: Vec<&[f64]> = draws.chunks_exact(len).take(chains).collect();
    let chain_means: Vec<f64> = splits.iter().map(|c| mean(c)).collect();
    let within = mean(&splits.iter().map(|c| variance(c)).collect::<Vec<_>>());
    if within <= 0.0 {
        return 1.0;
    }
    let between = len as f64 * variance(&chain_means);
    let len = len as f64;
    let pooled = (len - 1.0) / len * within + between / len;
    (pooled / within).sqrt()
}
