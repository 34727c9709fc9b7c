use tracing::{info, warn};

use crate::model::{FeatureMatrix, LabelVector, SeedSummary};

// Seeds outside these bounds are logged as a data-quality notice, never an error.
pub const MIN_SEED_POSITIVES: usize = 10;
pub const MAX_SEED_FRACTION: f64 = 0.5;

/// Label-free seed: sum each row's features, min-max rescale the sums across
/// rows, and mark a row positive iff its rescaled sum exceeds `threshold`.
///
/// When every row sum is equal the rescaled sums are all 0, so nothing is seeded.
pub fn initialize(features: &FeatureMatrix, threshold: f64) -> LabelVector {
    let sums: Vec<f64> = features.rows().map(|row| row.iter().sum()).collect();
    let (lo, hi) = sums
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = hi - lo;

    let flags: Vec<bool> = sums
        .iter()
        .map(|&s| {
            let scaled = if range > 0.0 { (s - lo) / range } else { 0.0 };
            scaled > threshold
        })
        .collect();
    LabelVector::from_bools(&flags)
}

/// Count seed positives and log data-quality notices for degenerate seeds.
pub fn summarize(seed: &LabelVector, what: &str) -> SeedSummary {
    let positives = seed.positives(0.5);
    let negatives = seed.len() - positives;
    let positive_fraction = if seed.is_empty() {
        0.0
    } else {
        positives as f64 / seed.len() as f64
    };

    info!(
        what,
        positives,
        negatives,
        positive_pct = positive_fraction * 100.0,
        "seed labeling"
    );
    if positives < MIN_SEED_POSITIVES {
        warn!(what, positives, "very few seed positives; results may be poor");
    } else if positive_fraction > MAX_SEED_FRACTION {
        warn!(what, positive_pct = positive_fraction * 100.0, "more than half the rows are seeded positive");
    }

    SeedSummary {
        positives,
        negatives,
        positive_fraction,
    }
}
