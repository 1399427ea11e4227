//! Thin wrappers over statrs distributions
//!
//! Every helper returns a plain `f64` and falls back to the normal
//! approximation when statrs rejects the parameters (e.g. non-finite degrees
//! of freedom), so callers never have to unwrap a distribution constructor.

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

/// Standard normal CDF Φ(x)
pub fn normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return 0.5;
    }
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal survival function 1 - Φ(x)
pub fn normal_sf(x: f64) -> f64 {
    normal_cdf(-x)
}

/// Standard normal density φ(x)
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Standard normal quantile Φ⁻¹(p), clamped to ±8.5 at the extremes
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return -8.5;
    }
    if p >= 1.0 {
        return 8.5;
    }
    (-SQRT_2 * erfc_inv(2.0 * p)).clamp(-8.5, 8.5)
}

/// Two-sided critical value z_{1-α/2} for a confidence level
pub fn z_critical(confidence_level: f64) -> f64 {
    normal_quantile(1.0 - (1.0 - confidence_level) / 2.0)
}

fn students_t(df: f64) -> Option<StudentsT> {
    if !df.is_finite() || df <= 0.0 || df > 1e7 {
        return None;
    }
    StudentsT::new(0.0, 1.0, df).ok()
}

/// Student t CDF with `df` degrees of freedom
pub fn t_cdf(t: f64, df: f64) -> f64 {
    match students_t(df) {
        Some(dist) => dist.cdf(t),
        None => normal_cdf(t),
    }
}

/// Two-sided p-value for a t statistic
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { 1.0 } else { 0.0 };
    }
    clamp_probability(2.0 * (1.0 - t_cdf(t.abs(), df)))
}

/// Two-sided critical value t_{1-α/2, df} for a confidence level
pub fn t_critical(confidence_level: f64, df: f64) -> f64 {
    let p = 1.0 - (1.0 - confidence_level) / 2.0;
    match students_t(df) {
        Some(dist) => {
            let q = dist.inverse_cdf(p);
            if q.is_finite() {
                q
            } else {
                normal_quantile(p)
            }
        }
        None => normal_quantile(p),
    }
}

/// Upper-tail probability P(F > f) for an F(d1, d2) variate
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if !(f.is_finite() && f > 0.0) {
        return if f.is_infinite() { 0.0 } else { 1.0 };
    }
    match FisherSnedecor::new(d1, d2) {
        Ok(dist) => clamp_probability(1.0 - dist.cdf(f)),
        Err(_) => 1.0,
    }
}

/// Lower-tail probability P(F <= f) for an F(d1, d2) variate
pub fn f_cdf(f: f64, d1: f64, d2: f64) -> f64 {
    1.0 - f_sf(f, d1, d2)
}

/// Clamp a probability into `[0, 1]`, mapping NaN to 1 (no evidence)
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        1.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_cdf_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.959964) - 0.975).abs() < 1e-5);
        assert!((normal_cdf(-1.959964) - 0.025).abs() < 1e-5);
    }

    #[test]
    fn test_normal_quantile_inverts_cdf() {
        for p in [0.01, 0.1, 0.5, 0.8, 0.975] {
            let x = normal_quantile(p);
            assert!((normal_cdf(x) - p).abs() < 1e-9, "p={}", p);
        }
        assert_eq!(normal_quantile(0.0), -8.5);
        assert_eq!(normal_quantile(1.0), 8.5);
    }

    #[test]
    fn test_t_critical_approaches_z() {
        let t_small = t_critical(0.95, 4.0);
        let t_large = t_critical(0.95, 10_000.0);
        assert!((t_small - 2.776).abs() < 0.01);
        assert!((t_large - 1.96).abs() < 0.01);
    }

    #[test]
    fn test_t_two_sided_p() {
        assert!((t_two_sided_p(0.0, 10.0) - 1.0).abs() < 1e-12);
        // t = 2.228 is the 97.5% quantile for df = 10
        assert!((t_two_sided_p(2.228, 10.0) - 0.05).abs() < 0.002);
        assert_eq!(t_two_sided_p(f64::INFINITY, 10.0), 0.0);
    }

    #[test]
    fn test_f_sf_is_real_distribution() {
        // F(5, 10) 95th percentile is ~3.326
        assert!((f_sf(3.326, 5.0, 10.0) - 0.05).abs() < 0.002);
        // Different inputs give different p-values
        assert!(f_sf(1.0, 5.0, 10.0) > f_sf(2.0, 5.0, 10.0));
        assert_eq!(f_sf(0.0, 5.0, 10.0), 1.0);
    }
}
