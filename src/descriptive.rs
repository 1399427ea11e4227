//! Descriptive statistics kernel
//!
//! Pure functions over `f64` slices. Empty or single-element inputs return
//! zero rather than NaN so that downstream tests can degrade gracefully.

use serde::{Deserialize, Serialize};

/// Summary of one sample
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn of(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self::default();
        }
        let variance = variance(data);
        Self {
            n: data.len(),
            mean: mean(data),
            variance,
            std_dev: variance.sqrt(),
            median: median(data),
            min: data.iter().copied().fold(f64::INFINITY, f64::min),
            max: data.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (n - 1 denominator)
pub fn variance(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n - 1) as f64
}

pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Pooled variance of two samples, weighted by degrees of freedom
pub fn pooled_variance(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 + n2 < 3 {
        return 0.0;
    }
    let df1 = n1.saturating_sub(1) as f64;
    let df2 = n2.saturating_sub(1) as f64;
    (df1 * variance(a) + df2 * variance(b)) / (df1 + df2)
}

/// Weighted mean Σ(v·w)/Σw; zero when the weights sum to zero
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total
}

/// Kish effective sample size (Σw)²/Σw²
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq <= 0.0 {
        0.0
    } else {
        sum * sum / sum_sq
    }
}

pub fn sorted_copy(data: &[f64]) -> Vec<f64> {
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

pub fn median(data: &[f64]) -> f64 {
    quantile(data, 0.5)
}

/// Quantile using linear interpolation between order statistics (R-7)
pub fn quantile(data: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted_copy(data), q)
}

/// Quantile of already-sorted data (R-7)
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let index = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = index - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Tie-averaged ranks (1-based) in the original order of `data`
pub fn rank_with_ties(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| data[a].total_cmp(&data[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        // `==` so that -0.0 and 0.0 share a rank, matching `tie_group_sizes`
        while j < n && data[order[j]] == data[order[i]] {
            j += 1;
        }
        // Positions i..j share the average of ranks i+1..=j
        let average = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = average;
        }
        i = j;
    }
    ranks
}

/// Sizes of tie groups (only groups with more than one member)
pub fn tie_group_sizes(data: &[f64]) -> Vec<usize> {
    let sorted = sorted_copy(data);
    let mut groups = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > 1 {
            groups.push(j - i);
        }
        i = j;
    }
    groups
}

/// Central moments m2, m3, m4 (population denominators)
fn central_moments(data: &[f64]) -> (f64, f64, f64) {
    let n = data.len() as f64;
    let m = mean(data);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &x in data {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Moment skewness g1; zero for fewer than 3 points or zero variance
pub fn skewness(data: &[f64]) -> f64 {
    if data.len() < 3 {
        return 0.0;
    }
    let (m2, m3, _) = central_moments(data);
    if m2 <= 0.0 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Excess kurtosis g2; zero for fewer than 4 points or zero variance
pub fn excess_kurtosis(data: &[f64]) -> f64 {
    if data.len() < 4 {
        return 0.0;
    }
    let (m2, _, m4) = central_moments(data);
    if m2 <= 0.0 {
        return 0.0;
    }
    m4 / (m2 * m2) - 3.0
}

/// Number of observations trimmed from each tail for a trim fraction
pub fn trim_count(n: usize, fraction: f64) -> usize {
    let g = (fraction.clamp(0.0, 0.49) * n as f64).floor() as usize;
    // Always keep at least one observation
    g.min(n.saturating_sub(1) / 2)
}

/// Symmetric trimmed mean
pub fn trimmed_mean(data: &[f64], fraction: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sorted = sorted_copy(data);
    let g = trim_count(sorted.len(), fraction);
    mean(&sorted[g..sorted.len() - g])
}

/// Winsorized sample variance matching a trim fraction
pub fn winsorized_variance(data: &[f64], fraction: f64) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mut sorted = sorted_copy(data);
    let n = sorted.len();
    let g = trim_count(n, fraction);
    if g > 0 {
        let low = sorted[g];
        let high = sorted[n - g - 1];
        for v in sorted.iter_mut().take(g) {
            *v = low;
        }
        for v in sorted.iter_mut().skip(n - g) {
            *v = high;
        }
    }
    variance(&sorted)
}

/// Coefficient of variation (std_dev / |mean|); zero when the mean is ~0
pub fn coefficient_of_variation(data: &[f64]) -> f64 {
    let m = mean(data);
    if data.is_empty() || m.abs() < 1e-12 {
        return 0.0;
    }
    std_dev(data) / m.abs()
}

/// Ordinary least squares fit `y = intercept + slope·x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
}

/// Simple linear regression; a flat line through the mean when x has no spread
pub fn linear_regression(x: &[f64], y: &[f64]) -> LinearFit {
    let n = x.len().min(y.len());
    if n < 2 {
        return LinearFit {
            intercept: mean(&y[..n]),
            slope: 0.0,
            r_squared: 0.0,
        };
    }
    let x_mean = mean(&x[..n]);
    let y_mean = mean(&y[..n]);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - x_mean;
        let dy = y[i] - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx < 1e-12 {
        return LinearFit {
            intercept: y_mean,
            slope: 0.0,
            r_squared: 0.0,
        };
    }

    let slope = sxy / sxx;
    let r_squared = if syy < 1e-12 {
        0.0
    } else {
        (sxy * sxy / (sxx * syy)).clamp(0.0, 1.0)
    };
    LinearFit {
        intercept: y_mean - slope * x_mean,
        slope,
        r_squared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_variance() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&data) - 5.0).abs() < 1e-12);
        // Sample variance: 32 / 7
        assert!((variance(&data) - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(variance(&[1.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[9.0, 1.0, 5.0, 3.0, 7.0]), 5.0);
    }

    #[test]
    fn test_median_even_length() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_rank_with_ties() {
        let ranks = rank_with_ties(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);

        let ranks = rank_with_ties(&[5.0, 5.0, 5.0]);
        assert_eq!(ranks, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_signed_zeros_are_tied() {
        let data = [0.0, 1.0, -0.0, -1.0];
        assert_eq!(rank_with_ties(&data), vec![2.5, 4.0, 2.5, 1.0]);
        assert_eq!(tie_group_sizes(&data), vec![2]);
    }

    #[test]
    fn test_tie_group_sizes() {
        assert_eq!(tie_group_sizes(&[1.0, 2.0, 2.0, 3.0, 3.0, 3.0]), vec![2, 3]);
        assert!(tie_group_sizes(&[1.0, 2.0, 3.0]).is_empty());
    }

    #[test]
    fn test_trimmed_mean_drops_outliers() {
        let data = [1.0, 2.0, 3.0, 4.0, 100.0];
        // 20% of 5 = 1 from each tail
        assert!((trimmed_mean(&data, 0.2) - 3.0).abs() < 1e-12);
        assert!((trimmed_mean(&data, 0.0) - 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_winsorized_variance_bounded_by_raw() {
        let data = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert!(winsorized_variance(&data, 0.2) < variance(&data));
    }

    #[test]
    fn test_skewness_symmetric_is_zero() {
        assert!(skewness(&[1.0, 2.0, 3.0, 4.0, 5.0]).abs() < 1e-12);
        assert!(skewness(&[1.0, 1.0, 1.0, 10.0]) > 0.0);
    }

    #[test]
    fn test_linear_regression_perfect_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = linear_regression(&x, &y);
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_effective_sample_size() {
        assert!((effective_sample_size(&[1.0, 1.0, 1.0, 1.0]) - 4.0).abs() < 1e-12);
        assert!(effective_sample_size(&[1.0, 0.1, 0.1]) < 3.0);
        assert_eq!(effective_sample_size(&[]), 0.0);
    }

    #[test]
    fn test_summary() {
        let s = Summary::of(&[1.0, 2.0, 3.0]);
        assert_eq!(s.n, 3);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.median, 2.0);
        assert_eq!(Summary::of(&[]).n, 0);
    }
}
