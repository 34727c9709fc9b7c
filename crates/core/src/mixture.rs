//! Class-conditional likelihoods for the two-class (match / non-match) mixture.
//!
//! Each feature, per class, is modelled as a Gaussian truncated to [0,1]:
//!
//! ```text
//! f(x | μ, σ) = φ((x - μ) / σ) / (σ · Z),   Z = Φ((1 - μ) / σ) - Φ(-μ / σ)
//! ```
//!
//! Parameters are re-estimated from fractionally weighted rows with a
//! pseudo-count of `c_bay · N` observations drawn from a moderate-spread prior
//! (location 0.5, variance 1/12, the moments of Uniform[0,1]):
//!
//! ```text
//! μ  = (Σ w x + n0 · 0.5) / (W + n0)
//! σ² = (Σ w (x - μ)² + n0 / 12) / (W + n0)
//! ```
//!
//! so for any `c_bay > 0` the spread stays strictly positive even when a class
//! owns no weight at all.

use serde::Serialize;
use tracing::debug;

use crate::model::FeatureMatrix;

const PRIOR_MEAN: f64 = 0.5;
const PRIOR_VARIANCE: f64 = 1.0 / 12.0;

/// Spread floor, only reachable when `c_bay = 0`.
pub const VAR_FLOOR: f64 = 1e-6;
const VAR_CEIL: f64 = 1.0;

/// Below this total weight (data + pseudo-count) a class is degenerate.
const MIN_CLASS_WEIGHT: f64 = 1e-12;

const PRIOR_FLOOR: f64 = 1e-6;
const Z_FLOOR: f64 = 1e-300;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

// ---------------------------------------------------------------------------
// Truncated Gaussian
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TruncatedGaussian {
    pub mean: f64,
    pub std_dev: f64,
    /// ln Z, cached.
    #[serde(skip)]
    log_norm: f64,
}

impl TruncatedGaussian {
    pub fn new(mean: f64, variance: f64) -> Self {
        let variance = variance.clamp(VAR_FLOOR, VAR_CEIL);
        let std_dev = variance.sqrt();
        let z = norm_cdf((1.0 - mean) / std_dev) - norm_cdf(-mean / std_dev);
        Self {
            mean,
            std_dev,
            log_norm: z.max(Z_FLOOR).ln(),
        }
    }

    /// The prior every class shrinks toward.
    pub fn prior() -> Self {
        Self::new(PRIOR_MEAN, PRIOR_VARIANCE)
    }

    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.std_dev;
        -0.5 * z * z - self.std_dev.ln() - LN_SQRT_2PI - self.log_norm
    }

    /// Regularized weighted fit. Returns the prior when the class is degenerate.
    fn fit(values: impl Iterator<Item = f64> + Clone, weights: &[f64], pseudo_count: f64) -> (Self, bool) {
        let total: f64 = weights.iter().sum::<f64>() + pseudo_count;
        if total < MIN_CLASS_WEIGHT {
            return (Self::prior(), true);
        }

        let weighted_sum: f64 = values.clone().zip(weights).map(|(x, w)| w * x).sum();
        let mean = (weighted_sum + pseudo_count * PRIOR_MEAN) / total;

        let scatter: f64 = values
            .zip(weights)
            .map(|(x, w)| {
                let d = x - mean;
                w * d * d
            })
            .sum();
        let variance = (scatter + pseudo_count * PRIOR_VARIANCE) / total;

        (Self::new(mean, variance), false)
    }
}

// ---------------------------------------------------------------------------
// Mixture parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureParams {
    pub feature: String,
    pub matched: TruncatedGaussian,
    pub unmatched: TruncatedGaussian,
}

/// θ: class prior plus per-feature, per-class likelihood parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixtureParameters {
    pub match_prior: f64,
    pub features: Vec<FeatureParams>,
}

impl MixtureParameters {
    /// M-step: fit θ treating `weights[i]` as row i's match membership.
    pub fn estimate(matrix: &FeatureMatrix, weights: &[f64], c_bay: f64) -> Self {
        let n = matrix.n_rows() as f64;
        let pseudo_count = c_bay * n;

        let match_weights: Vec<f64> = weights.to_vec();
        let unmatch_weights: Vec<f64> = weights.iter().map(|w| 1.0 - w).collect();

        let matched_total: f64 = match_weights.iter().sum();
        let match_prior = ((matched_total + pseudo_count) / (n + 2.0 * pseudo_count))
            .clamp(PRIOR_FLOOR, 1.0 - PRIOR_FLOOR);

        let features = matrix
            .schema()
            .names()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let (matched, m_degenerate) =
                    TruncatedGaussian::fit(matrix.column(j), &match_weights, pseudo_count);
                let (unmatched, u_degenerate) =
                    TruncatedGaussian::fit(matrix.column(j), &unmatch_weights, pseudo_count);
                if m_degenerate || u_degenerate {
                    debug!(
                        feature = %name,
                        matched_degenerate = m_degenerate,
                        unmatched_degenerate = u_degenerate,
                        "class has no weight; falling back to prior"
                    );
                }
                FeatureParams {
                    feature: name.clone(),
                    matched,
                    unmatched,
                }
            })
            .collect();

        Self {
            match_prior,
            features,
        }
    }

    /// Log-likelihood of `row` under each class, prior included: (match, non-match).
    pub fn log_joint(&self, row: &[f64]) -> (f64, f64) {
        let mut log_m = self.match_prior.ln();
        let mut log_u = (1.0 - self.match_prior).ln();
        for (params, &x) in self.features.iter().zip(row) {
            log_m += params.matched.log_pdf(x);
            log_u += params.unmatched.log_pdf(x);
        }
        (log_m, log_u)
    }

    /// P(match | row), naive-Bayes over features.
    pub fn posterior(&self, row: &[f64]) -> f64 {
        let (log_m, log_u) = self.log_joint(row);
        logistic(log_m - log_u)
    }

    /// Σ |Δμ| + |Δσ| over features and classes, plus |Δ prior|.
    pub fn distance(&self, other: &Self) -> f64 {
        let features: f64 = self
            .features
            .iter()
            .zip(&other.features)
            .map(|(a, b)| {
                (a.matched.mean - b.matched.mean).abs()
                    + (a.matched.std_dev - b.matched.std_dev).abs()
                    + (a.unmatched.mean - b.unmatched.mean).abs()
                    + (a.unmatched.std_dev - b.unmatched.std_dev).abs()
            })
            .sum();
        features + (self.match_prior - other.match_prior).abs()
    }
}

/// 1 / (1 + e^-d), without overflow for large |d|.
fn logistic(d: f64) -> f64 {
    if d >= 0.0 {
        1.0 / (1.0 + (-d).exp())
    } else {
        let e = d.exp();
        e / (1.0 + e)
    }
}

/// Error function approximation (Abramowitz & Stegun 7.1.26, max error ~1.5e-7)
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal CDF: Φ(z) = 0.5 * (1 + erf(z / sqrt(2)))
fn norm_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}
