//! Precision / recall / F1 against ground truth. Reporting only.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use crate::model::{CandidatePair, PairTable};

/// Thresholds tried by [`threshold_sweep`].
pub const SWEEP_THRESHOLDS: [f64; 9] = [0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.99];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub predicted_positives: usize,
    pub actual_positives: usize,
}

/// Score `probabilities` against `gold` (1 = match). A row is predicted a
/// match when its probability is strictly above `threshold`.
pub fn evaluate(gold: &[u8], probabilities: &[f64], threshold: f64) -> QualityMetrics {
    let mut tp = 0;
    let mut fp = 0;
    let mut fn_ = 0;
    for (&g, &p) in gold.iter().zip(probabilities) {
        match (p > threshold, g == 1) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    QualityMetrics {
        threshold,
        precision,
        recall,
        f1,
        true_positives: tp,
        false_positives: fp,
        false_negatives: fn_,
        predicted_positives: tp + fp,
        actual_positives: tp + fn_,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdSweep {
    pub rows: usize,
    pub actual_positives: usize,
    pub results: Vec<QualityMetrics>,
    /// Highest-F1 entry; ties go to the lower threshold.
    pub best: Option<QualityMetrics>,
}

pub fn threshold_sweep(gold: &[u8], probabilities: &[f64], thresholds: &[f64]) -> ThresholdSweep {
    let results: Vec<QualityMetrics> = thresholds
        .iter()
        .map(|&t| evaluate(gold, probabilities, t))
        .collect();

    let best = results
        .iter()
        .fold(None::<&QualityMetrics>, |best, m| match best {
            Some(b) if b.f1 >= m.f1 => Some(b),
            _ => Some(m),
        })
        .cloned();

    if let Some(ref b) = best {
        info!(threshold = b.threshold, f1 = b.f1, "best threshold by F1");
    }

    ThresholdSweep {
        rows: gold.len().min(probabilities.len()),
        actual_positives: gold.iter().filter(|&&g| g == 1).count(),
        results,
        best,
    }
}

/// Gold vector aligned with `pairs`: 1 where the pair appears in `matches`.
///
/// Returns the vector and the number of listed matches absent from `pairs`
/// (pruned by blocking, typically).
pub fn gold_from_matches(pairs: &PairTable, matches: &[CandidatePair]) -> (Vec<u8>, usize) {
    let listed: HashSet<(&str, &str)> = matches
        .iter()
        .map(|m| (m.left_id.as_str(), m.right_id.as_str()))
        .collect();
    let gold: Vec<u8> = pairs
        .iter()
        .map(|p| u8::from(listed.contains(&(p.left_id.as_str(), p.right_id.as_str()))))
        .collect();

    let present: HashSet<(&str, &str)> = pairs
        .iter()
        .map(|p| (p.left_id.as_str(), p.right_id.as_str()))
        .collect();
    let missing = listed.iter().filter(|k| !present.contains(*k)).count();
    (gold, missing)
}
