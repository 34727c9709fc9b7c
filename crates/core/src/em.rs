//! Expectation-Maximization over the two-class mixture.
//!
//! State is `(θ, π)`. Every iteration runs an M-step (θ from π as fractional
//! class weights) followed by an E-step (π as the naive-Bayes posterior under θ).
//! The loop stops when θ moves less than `convergence_epsilon` between two
//! consecutive M-steps, or at `max_iterations`. Either way the last π is returned.

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::config::MatcherConfig;
use crate::mixture::MixtureParameters;
use crate::model::{FeatureMatrix, FitSummary, LabelVector};

/// Hard EM binarizes π at this value after each E-step.
const HARD_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmSettings {
    pub c_bay: f64,
    pub hard: bool,
    pub max_iterations: usize,
    pub convergence_epsilon: f64,
}

impl From<&MatcherConfig> for EmSettings {
    fn from(config: &MatcherConfig) -> Self {
        Self {
            c_bay: config.c_bay,
            hard: config.hard,
            max_iterations: config.max_iterations,
            convergence_epsilon: config.convergence_epsilon,
        }
    }
}

/// Result of one EM run.
#[derive(Debug, Clone)]
pub struct EmFit {
    pub posteriors: LabelVector,
    pub parameters: MixtureParameters,
    pub iterations: usize,
    pub converged: bool,
    /// θ delta of the last iteration (infinite if only one iteration ran).
    pub final_delta: f64,
}

impl EmFit {
    pub fn summary(&self) -> FitSummary {
        FitSummary {
            iterations: self.iterations,
            converged: self.converged,
            final_delta: self.final_delta.is_finite().then_some(self.final_delta),
            parameters: self.parameters.clone(),
        }
    }
}

/// Fit the mixture starting from `seed`. Ground truth never enters here.
///
/// The per-row E-step runs inside `pool`; reductions in the M-step are
/// sequential, so the output does not depend on the pool size.
pub fn fit(
    matrix: &FeatureMatrix,
    seed: LabelVector,
    settings: &EmSettings,
    pool: &ThreadPool,
    what: &str,
) -> EmFit {
    let mut labels = seed;
    let mut previous: Option<MixtureParameters> = None;
    let mut delta = f64::INFINITY;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < settings.max_iterations {
        iterations += 1;

        let theta = MixtureParameters::estimate(matrix, labels.as_slice(), settings.c_bay);
        if let Some(ref prev) = previous {
            delta = theta.distance(prev);
        }

        let mut next = e_step(matrix, &theta, pool);
        if settings.hard {
            next = next.binarize(HARD_THRESHOLD);
        }

        debug!(
            what,
            iteration = iterations,
            delta,
            match_prior = theta.match_prior,
            label_change = next.total_abs_diff(&labels),
            "em iteration"
        );

        labels = next;
        previous = Some(theta);

        if delta < settings.convergence_epsilon {
            converged = true;
            break;
        }
    }

    if converged {
        info!(what, iterations, delta, "em converged");
    } else {
        warn!(
            what,
            iterations,
            delta,
            "em reached the iteration cap before converging; returning last posteriors"
        );
    }

    let parameters = match previous {
        Some(theta) => theta,
        // max_iterations >= 1 is enforced by config validation; still fit once.
        None => MixtureParameters::estimate(matrix, labels.as_slice(), settings.c_bay),
    };

    EmFit {
        posteriors: labels,
        parameters,
        iterations,
        converged,
        final_delta: delta,
    }
}

/// π_i = P(match | row_i) under θ.
pub fn e_step(matrix: &FeatureMatrix, theta: &MixtureParameters, pool: &ThreadPool) -> LabelVector {
    let posteriors: Vec<f64> = pool.install(|| {
        (0..matrix.n_rows())
            .into_par_iter()
            .map(|i| theta.posterior(matrix.row(i)))
            .collect()
    });
    LabelVector::new(posteriors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureSchema;
    use crate::seed::initialize;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    fn settings() -> EmSettings {
        EmSettings::from(&MatcherConfig::default())
    }

    fn single_feature(values: &[f64]) -> FeatureMatrix {
        FeatureMatrix::from_rows(
            FeatureSchema::new(vec!["sim".into()]),
            values.iter().map(|&v| vec![v]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn four_row_scenario_converges_to_seed() {
        let m = single_feature(&[0.95, 0.90, 0.05, 0.02]);
        let seed = initialize(&m, 0.8);
        let fit = fit(&m, seed, &settings(), &pool(1), "features");
        assert!(fit.converged, "iterations = {}", fit.iterations);
        assert!(fit.iterations <= 40);
        let pi = fit.posteriors.as_slice();
        assert!(pi[0] > 0.99 && pi[1] > 0.99, "{pi:?}");
        assert!(pi[2] < 0.01 && pi[3] < 0.01, "{pi:?}");
    }

    #[test]
    fn no_seed_positives_stays_well_defined() {
        let m = single_feature(&[0.3, 0.3, 0.3, 0.3]);
        let seed = initialize(&m, 0.8);
        assert_eq!(seed.positives(0.5), 0);
        let fit = fit(&m, seed, &settings(), &pool(1), "features");
        for &p in fit.posteriors.as_slice() {
            assert!(p.is_finite() && (0.0..=1.0).contains(&p));
        }
        for f in &fit.parameters.features {
            assert!(f.matched.std_dev > 0.0 && f.unmatched.std_dev > 0.0);
        }
    }

    #[test]
    fn hard_mode_yields_binary_labels() {
        let m = single_feature(&[0.95, 0.7, 0.4, 0.05, 0.02]);
        let seed = initialize(&m, 0.8);
        let s = EmSettings {
            hard: true,
            ..settings()
        };
        let fit = fit(&m, seed, &s, &pool(1), "features");
        for &p in fit.posteriors.as_slice() {
            assert!(p == 0.0 || p == 1.0, "{p}");
        }
    }

    #[test]
    fn iteration_cap_returns_last_posteriors() {
        let m = single_feature(&[0.95, 0.6, 0.5, 0.4, 0.05]);
        let seed = initialize(&m, 0.5);
        let s = EmSettings {
            max_iterations: 1,
            ..settings()
        };
        let fit = fit(&m, seed, &s, &pool(1), "features");
        assert_eq!(fit.iterations, 1);
        assert!(!fit.converged);
        assert_eq!(fit.posteriors.len(), 5);
        assert!(fit.summary().final_delta.is_none());
    }

    #[test]
    fn pool_size_does_not_change_output() {
        let rows: Vec<Vec<f64>> = (0..200)
            .map(|i| {
                let x = (i as f64 * 0.618_033_988_75).fract();
                vec![x, (x * 0.7 + 0.1).min(1.0), 1.0 - x * x]
            })
            .collect();
        let m = FeatureMatrix::from_rows(
            FeatureSchema::new(vec!["a".into(), "b".into(), "c".into()]),
            rows,
        )
        .unwrap();
        let seed = initialize(&m, 0.8);
        let one = fit(&m, seed.clone(), &settings(), &pool(1), "features");
        let four = fit(&m, seed, &settings(), &pool(4), "features");
        assert_eq!(one.posteriors, four.posteriors);
        assert_eq!(one.parameters, four.parameters);
    }
}
