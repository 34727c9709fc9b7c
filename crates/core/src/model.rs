use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::ZeroerError;
use crate::mixture::MixtureParameters;
use crate::metrics::QualityMetrics;

// ---------------------------------------------------------------------------
// Pair identity
// ---------------------------------------------------------------------------

/// One candidate (left record, right record) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CandidatePair {
    pub left_id: String,
    pub right_id: String,
}

impl CandidatePair {
    pub fn new(left_id: impl Into<String>, right_id: impl Into<String>) -> Self {
        Self {
            left_id: left_id.into(),
            right_id: right_id.into(),
        }
    }

    pub fn is_diagonal(&self) -> bool {
        self.left_id == self.right_id
    }
}

/// Row index -> pair identity. Aligned with the rows of a [`FeatureMatrix`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairTable {
    pairs: Vec<CandidatePair>,
}

impl PairTable {
    pub fn new(pairs: Vec<CandidatePair>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&CandidatePair> {
        self.pairs.get(row)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CandidatePair> {
        self.pairs.iter()
    }

    /// Row indices whose pair is not an identity pair (`left_id == right_id`).
    pub fn off_diagonal_rows(&self) -> Vec<usize> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_diagonal())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            pairs: rows.iter().map(|&i| self.pairs[i].clone()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Feature schema
// ---------------------------------------------------------------------------

/// Ordered list of named similarity features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Sorted intersection of several schemas.
    pub fn intersect<'a>(schemas: impl IntoIterator<Item = &'a FeatureSchema>) -> FeatureSchema {
        let mut iter = schemas.into_iter();
        let Some(first) = iter.next() else {
            return FeatureSchema::new(Vec::new());
        };
        let mut common: BTreeSet<&str> = first.names.iter().map(String::as_str).collect();
        for schema in iter {
            let names: BTreeSet<&str> = schema.names.iter().map(String::as_str).collect();
            common = common.intersection(&names).copied().collect();
        }
        FeatureSchema::new(common.into_iter().map(str::to_string).collect())
    }
}

// ---------------------------------------------------------------------------
// Feature matrix
// ---------------------------------------------------------------------------

/// Dense row-major N x F matrix of pair similarity features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    schema: FeatureSchema,
    rows: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from row-major values. `values.len()` must equal `rows * schema.len()`.
    pub fn new(schema: FeatureSchema, rows: usize, values: Vec<f64>) -> Result<Self, ZeroerError> {
        if values.len() != rows * schema.len() {
            return Err(ZeroerError::ShapeMismatch(format!(
                "{} value(s) for {rows} row(s) x {} feature(s)",
                values.len(),
                schema.len()
            )));
        }
        Ok(Self {
            schema,
            rows,
            values,
        })
    }

    /// Build from one `Vec` per row.
    pub fn from_rows(schema: FeatureSchema, rows: Vec<Vec<f64>>) -> Result<Self, ZeroerError> {
        let width = schema.len();
        let n = rows.len();
        let mut values = Vec::with_capacity(n * width);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(ZeroerError::ShapeMismatch(format!(
                    "row {i} has {} value(s), schema has {width} feature(s)",
                    row.len()
                )));
            }
            values.extend(row);
        }
        Self::new(schema, n, values)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_features(&self) -> usize {
        self.schema.len()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.n_features();
        &self.values[i * width..(i + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // Zero-width matrices hold no values, so the max(1) only keeps chunks_exact happy.
        self.values.chunks_exact(self.n_features().max(1))
    }

    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + Clone + '_ {
        let width = self.n_features();
        (0..self.rows).map(move |i| self.values[i * width + j])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Reorder/select columns to match `target`. Every target feature must exist here.
    pub fn project(&self, target: &FeatureSchema) -> Result<Self, ZeroerError> {
        let indices: Vec<usize> = target
            .names()
            .iter()
            .map(|name| {
                self.schema.position(name).ok_or_else(|| {
                    ZeroerError::ShapeMismatch(format!("feature '{name}' not present in matrix"))
                })
            })
            .collect::<Result<_, _>>()?;

        let mut values = Vec::with_capacity(self.rows * indices.len());
        for row in self.rows() {
            values.extend(indices.iter().map(|&j| row[j]));
        }
        Self::new(target.clone(), self.rows, values)
    }

    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut values = Vec::with_capacity(rows.len() * self.n_features());
        for &i in rows {
            values.extend_from_slice(self.row(i));
        }
        Self {
            schema: self.schema.clone(),
            rows: rows.len(),
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Per-row match belief in [0,1] (soft) or {0,1} (hard).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LabelVector(Vec<f64>);

impl LabelVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn from_bools(flags: &[bool]) -> Self {
        Self(flags.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Threshold into {0,1}: strictly above `threshold` is a match.
    pub fn binarize(&self, threshold: f64) -> Self {
        Self(
            self.0
                .iter()
                .map(|&p| if p > threshold { 1.0 } else { 0.0 })
                .collect(),
        )
    }

    pub fn positives(&self, threshold: f64) -> usize {
        self.0.iter().filter(|&&p| p > threshold).count()
    }

    pub fn total_abs_diff(&self, other: &Self) -> f64 {
        self.0.iter().zip(&other.0).map(|(a, b)| (a - b).abs()).sum()
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A loaded feature matrix plus its parallel identity table and optional gold.
#[derive(Debug, Clone)]
pub struct PairDataset {
    pub pairs: PairTable,
    pub features: FeatureMatrix,
    /// Ground truth {0,1}; reporting only, never used for fitting.
    pub gold: Option<Vec<u8>>,
}

impl PairDataset {
    pub fn new(
        pairs: PairTable,
        features: FeatureMatrix,
        gold: Option<Vec<u8>>,
    ) -> Result<Self, ZeroerError> {
        if pairs.len() != features.n_rows() {
            return Err(ZeroerError::MissingIdentityTable(format!(
                "{} pair id(s) for {} feature row(s)",
                pairs.len(),
                features.n_rows()
            )));
        }
        if let Some(ref g) = gold {
            if g.len() != features.n_rows() {
                return Err(ZeroerError::ShapeMismatch(format!(
                    "{} gold label(s) for {} feature row(s)",
                    g.len(),
                    features.n_rows()
                )));
            }
        }
        Ok(Self {
            pairs,
            features,
            gold,
        })
    }

    /// Drop identity pairs (`left_id == right_id`). Returns the dataset and the removed count.
    pub fn without_diagonal(self) -> (Self, usize) {
        let keep = self.pairs.off_diagonal_rows();
        let removed = self.pairs.len() - keep.len();
        if removed == 0 {
            return (self, 0);
        }
        let gold = self
            .gold
            .as_ref()
            .map(|g| keep.iter().map(|&i| g[i]).collect());
        let dataset = Self {
            pairs: self.pairs.select(&keep),
            features: self.features.select_rows(&keep),
            gold,
        };
        (dataset, removed)
    }

    pub fn project(self, schema: &FeatureSchema) -> Result<Self, ZeroerError> {
        if self.features.schema() == schema {
            return Ok(self);
        }
        let features = self.features.project(schema)?;
        Ok(Self { features, ..self })
    }
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub main: PairDataset,
    /// Left table against itself.
    pub left_self: Option<PairDataset>,
    /// Right table against itself.
    pub right_self: Option<PairDataset>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PairPrediction {
    pub left_id: String,
    pub right_id: String,
    pub probability: f64,
    pub is_match: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub positives: usize,
    pub negatives: usize,
    pub positive_fraction: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub iterations: usize,
    pub converged: bool,
    /// θ movement in the last iteration; absent when only one iteration ran.
    pub final_delta: Option<f64>,
    pub parameters: MixtureParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitivitySummary {
    pub left_classes: usize,
    pub right_classes: usize,
    /// Main-matrix rows whose probability was raised to their group's representative.
    pub adjusted_rows: usize,
    /// Absent when the self-join held only identity pairs.
    pub left_fit: Option<FitSummary>,
    pub right_fit: Option<FitSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub hard: bool,
    pub rescaled: bool,
    pub diagonal_rows_removed: usize,
    pub transitivity_applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub meta: MatchMeta,
    pub schema: FeatureSchema,
    pub seed: SeedSummary,
    pub fit: FitSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitivity: Option<TransitivitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetrics>,
    pub pairs: Vec<PairPrediction>,
}

impl MatchOutcome {
    pub fn probabilities(&self) -> Vec<f64> {
        self.pairs.iter().map(|p| p.probability).collect()
    }

    pub fn to_json_pretty(&self) -> Result<String, ZeroerError> {
        serde_json::to_string_pretty(self).map_err(|e| ZeroerError::Io(e.to_string()))
    }
}
