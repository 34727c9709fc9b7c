//! Pre-flight checks on a feature dataset. Reports problems, never fails on them.

use serde::Serialize;
use tracing::warn;

use crate::model::{FeatureMatrix, PairDataset};
use crate::normalize::normalize;
use crate::seed::{initialize, MAX_SEED_FRACTION, MIN_SEED_POSITIVES};

const MIN_GOLD_RATIO: f64 = 0.001;
const MAX_GOLD_RATIO: f64 = 0.1;
const SMALL_RANGE: f64 = 0.001;
const MEDIUM_ROWS: usize = 50_000;
const LARGE_ROWS: usize = 100_000;
const MANY_FEATURES: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct FeatureStats {
    /// Smallest finite value over all features.
    pub min: f64,
    pub max: f64,
    /// Mean of per-feature means.
    pub mean: f64,
    /// Mean of per-feature standard deviations.
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedCheck {
    pub threshold: f64,
    pub positives: usize,
    pub negatives: usize,
    pub positive_fraction: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoldCheck {
    pub positives: usize,
    pub positive_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub rows: usize,
    pub features: usize,
    pub feature_names: Vec<String>,
    pub stats: Option<FeatureStats>,
    pub non_finite_values: usize,
    pub constant_features: Vec<String>,
    pub small_range_features: Vec<String>,
    /// Absent when the matrix is empty or holds non-finite values.
    pub seed: Option<SeedCheck>,
    pub gold: Option<GoldCheck>,
    pub warnings: Vec<String>,
}

impl DiagnosticReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub fn diagnose(dataset: &PairDataset, init_threshold: f64) -> DiagnosticReport {
    let matrix = &dataset.features;
    let rows = matrix.n_rows();
    let width = matrix.n_features();
    let names = matrix.schema().names();
    let mut warnings = Vec::new();

    let non_finite_values = matrix.values().iter().filter(|v| !v.is_finite()).count();
    if non_finite_values > 0 {
        warnings.push(format!("{non_finite_values} non-finite feature value(s)"));
    }

    let mut constant_features = Vec::new();
    let mut small_range_features = Vec::new();
    let mut per_feature = Vec::with_capacity(width);
    for (j, name) in names.iter().enumerate() {
        let Some(col) = column_stats(matrix, j) else {
            continue;
        };
        let range = col.max - col.min;
        if range == 0.0 {
            constant_features.push(name.clone());
        } else if range < SMALL_RANGE {
            small_range_features.push(name.clone());
        }
        per_feature.push(col);
    }
    if !constant_features.is_empty() {
        warnings.push(format!(
            "{} constant feature(s): {}",
            constant_features.len(),
            constant_features.join(", ")
        ));
    }
    if !small_range_features.is_empty() {
        warnings.push(format!(
            "{} feature(s) with range < {SMALL_RANGE}",
            small_range_features.len()
        ));
    }

    let stats = (!per_feature.is_empty()).then(|| {
        let k = per_feature.len() as f64;
        FeatureStats {
            min: per_feature.iter().map(|c| c.min).fold(f64::INFINITY, f64::min),
            max: per_feature.iter().map(|c| c.max).fold(f64::NEG_INFINITY, f64::max),
            mean: per_feature.iter().map(|c| c.mean).sum::<f64>() / k,
            std_dev: per_feature.iter().map(|c| c.std_dev).sum::<f64>() / k,
        }
    });

    let seed = if non_finite_values == 0 {
        seed_check(matrix, init_threshold)
    } else {
        None
    };
    if let Some(ref s) = seed {
        if s.positives < MIN_SEED_POSITIVES {
            warnings.push(format!(
                "only {} seed positive(s) at init_threshold {}",
                s.positives, s.threshold
            ));
        } else if s.positive_fraction > MAX_SEED_FRACTION {
            warnings.push(format!(
                "{:.1}% of rows seeded positive at init_threshold {}",
                s.positive_fraction * 100.0,
                s.threshold
            ));
        }
    }

    let gold = dataset.gold.as_ref().map(|g| {
        let positives = g.iter().filter(|&&v| v == 1).count();
        GoldCheck {
            positives,
            positive_ratio: if g.is_empty() { 0.0 } else { positives as f64 / g.len() as f64 },
        }
    });
    if let Some(ref g) = gold {
        if g.positive_ratio < MIN_GOLD_RATIO {
            warnings.push(format!(
                "gold positive ratio {:.4} is very low; blocking may be too loose",
                g.positive_ratio
            ));
        } else if g.positive_ratio > MAX_GOLD_RATIO {
            warnings.push(format!(
                "gold positive ratio {:.4} is high; blocking may be too strict",
                g.positive_ratio
            ));
        }
    }

    if rows > LARGE_ROWS {
        warnings.push(format!("large candidate set ({rows} pairs); EM will be slow"));
    } else if rows > MEDIUM_ROWS {
        warnings.push(format!("medium candidate set ({rows} pairs); EM may be slow"));
    }
    if width > MANY_FEATURES {
        warnings.push(format!("many features ({width}); EM may be slow"));
    }

    for w in &warnings {
        warn!(target: "zeroer::diagnose", "{w}");
    }

    DiagnosticReport {
        rows,
        features: width,
        feature_names: names.to_vec(),
        stats,
        non_finite_values,
        constant_features,
        small_range_features,
        seed,
        gold,
        warnings,
    }
}

struct ColumnStats {
    min: f64,
    max: f64,
    mean: f64,
    std_dev: f64,
}

/// Stats over the finite values of column `j`; `None` if it has none.
fn column_stats(matrix: &FeatureMatrix, j: usize) -> Option<ColumnStats> {
    let values: Vec<f64> = matrix.column(j).filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / n;
    // Sample standard deviation, 0 for a single value.
    let std_dev = if values.len() > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    Some(ColumnStats {
        min,
        max,
        mean,
        std_dev,
    })
}

fn seed_check(matrix: &FeatureMatrix, threshold: f64) -> Option<SeedCheck> {
    // Same path as a real run: normalize first, then seed.
    let normalized = normalize(matrix.clone(), "features").ok()?;
    let seed = initialize(&normalized.matrix, threshold);
    let positives = seed.positives(0.5);
    Some(SeedCheck {
        threshold,
        positives,
        negatives: seed.len() - positives,
        positive_fraction: positives as f64 / seed.len() as f64,
    })
}
