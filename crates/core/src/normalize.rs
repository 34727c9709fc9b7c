//! Feature normalizer: every similarity value must lie in [0,1].

use tracing::{info, warn};

use crate::error::ZeroerError;
use crate::model::FeatureMatrix;

/// Normalizer output.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub matrix: FeatureMatrix,
    /// True when at least one value was out of range and every column was min-max rescaled.
    pub rescaled: bool,
}

/// Pass the matrix through if every value is in [0,1]; otherwise min-max
/// rescale every column into [0,1]. Constant columns rescale to 0.
///
/// `what` names the matrix in logs and errors ("features", "left self-join", ...).
pub fn normalize(matrix: FeatureMatrix, what: &str) -> Result<Normalized, ZeroerError> {
    if matrix.n_rows() == 0 || matrix.n_features() == 0 {
        return Err(ZeroerError::EmptyMatrix {
            what: what.to_string(),
            rows: matrix.n_rows(),
            columns: matrix.n_features(),
        });
    }

    let (min, max) = matrix
        .values()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    // NaN cannot be rescaled into range.
    if let Some(pos) = matrix.values().iter().position(|v| v.is_nan()) {
        let width = matrix.n_features();
        return Err(ZeroerError::InputRange {
            column: matrix.schema().names()[pos % width].clone(),
            row: pos / width,
            value: f64::NAN,
        });
    }

    if min >= 0.0 && max <= 1.0 {
        info!(what, min, max, "features are in [0,1]");
        return Ok(Normalized {
            matrix,
            rescaled: false,
        });
    }

    warn!(
        what,
        min,
        max,
        "features are not in [0,1]; rescaling every column by its min/max (check upstream feature extraction)"
    );

    let mut matrix = matrix;
    let width = matrix.n_features();
    let rows = matrix.n_rows();
    for j in 0..width {
        let (lo, hi) = matrix
            .column(j)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let scale = column_scale(lo, hi);
        let (lo, hi) = (lo / scale, hi / scale);
        let range = hi - lo;
        let values = matrix.values_mut();
        for i in 0..rows {
            let v = &mut values[i * width + j];
            *v = if range > 0.0 { (*v / scale - lo) / range } else { 0.0 };
        }
    }

    check_range(&matrix)?;
    Ok(Normalized {
        matrix,
        rescaled: true,
    })
}

/// Divisor that keeps `hi - lo` finite for finite columns near the f64 limits.
/// Columns holding an infinity keep a scale of 1 and fail the range check.
fn column_scale(lo: f64, hi: f64) -> f64 {
    if lo.is_finite() && hi.is_finite() && !(hi - lo).is_finite() {
        hi.abs().max(lo.abs())
    } else {
        1.0
    }
}

/// Fail on the first value outside [0,1] (NaN and infinities included).
pub fn check_range(matrix: &FeatureMatrix) -> Result<(), ZeroerError> {
    for (i, row) in matrix.rows().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ZeroerError::InputRange {
                    column: matrix.schema().names()[j].clone(),
                    row: i,
                    value,
                });
            }
        }
    }
    Ok(())
}
