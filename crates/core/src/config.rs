use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ZeroerError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// A `.zeroer.toml` project file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZeroerConfig {
    pub name: String,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub dataset: DatasetConfig,
    /// Dataset id -> blocking rule. Resolved into a registry at load time.
    #[serde(default)]
    pub blocking: BTreeMap<String, BlockingRule>,
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    /// Seed threshold on the rescaled row sum.
    pub init_threshold: f64,
    /// Regularization strength, as a fraction of the row count used as pseudo-count.
    pub c_bay: f64,
    /// Binarize posteriors after every E-step.
    pub hard: bool,
    pub run_transitivity: bool,
    /// Left and right tables carry no internal duplicates.
    #[serde(alias = "LR_dup_free")]
    pub lr_dup_free: bool,
    /// Left and right are the same table.
    #[serde(alias = "LR_identical")]
    pub lr_identical: bool,
    pub max_iterations: usize,
    pub convergence_epsilon: f64,
    /// Decision threshold for hard labels, equivalence classes and metrics.
    pub match_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            init_threshold: 0.8,
            c_bay: 0.015,
            hard: false,
            run_transitivity: false,
            lr_dup_free: false,
            lr_identical: false,
            max_iterations: 40,
            convergence_epsilon: 1e-6,
            match_threshold: 0.5,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ZeroerError> {
        if !(self.init_threshold > 0.0 && self.init_threshold < 1.0) {
            return Err(ZeroerError::ConfigValidation(format!(
                "init_threshold must be in (0, 1), got {}",
                self.init_threshold
            )));
        }
        if !(0.0..=0.1).contains(&self.c_bay) {
            return Err(ZeroerError::ConfigValidation(format!(
                "c_bay must be in [0, 0.1], got {}",
                self.c_bay
            )));
        }
        if self.max_iterations == 0 {
            return Err(ZeroerError::ConfigValidation(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.convergence_epsilon.is_finite() && self.convergence_epsilon > 0.0) {
            return Err(ZeroerError::ConfigValidation(format!(
                "convergence_epsilon must be a positive number, got {}",
                self.convergence_epsilon
            )));
        }
        if !(self.match_threshold > 0.0 && self.match_threshold < 1.0) {
            return Err(ZeroerError::ConfigValidation(format!(
                "match_threshold must be in (0, 1), got {}",
                self.match_threshold
            )));
        }
        Ok(())
    }

    /// Self-join passes are needed only when the tables may hold internal
    /// duplicates and are not the same table.
    pub fn needs_self_join(&self) -> bool {
        self.run_transitivity && !self.lr_dup_free && !self.lr_identical
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Process resources, passed in explicitly at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Worker threads for the per-row E-step. Pinned to 1 unless raised.
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { worker_threads: 1 }
    }
}

// ---------------------------------------------------------------------------
// Dataset files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Cross-table feature CSV (ltable_id, rtable_id, [gold], features...).
    pub features: String,
    /// Left-table self-join feature CSV.
    #[serde(default)]
    pub left_features: Option<String>,
    /// Right-table self-join feature CSV.
    #[serde(default)]
    pub right_features: Option<String>,
    /// Where to write `ltable_id,rtable_id,pred`.
    #[serde(default)]
    pub output: Option<String>,
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BlockingRule {
    /// Every left record against every right record.
    CrossProduct,
    /// Word-level token overlap on one attribute.
    Overlap {
        left_column: String,
        right_column: String,
        #[serde(default = "default_overlap_size")]
        overlap_size: usize,
        #[serde(default)]
        allow_missing: bool,
    },
    /// Overlap on a first attribute, then filter the survivors on a second.
    TwoStage {
        first: OverlapRule,
        second: OverlapRule,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlapRule {
    pub left_column: String,
    pub right_column: String,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
    #[serde(default)]
    pub allow_missing: bool,
}

fn default_overlap_size() -> usize {
    1
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ZeroerConfig {
    pub fn from_toml(input: &str) -> Result<Self, ZeroerError> {
        let config: ZeroerConfig =
            toml::from_str(input).map_err(|e| ZeroerError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ZeroerError> {
        self.matcher.validate()?;

        if self.runtime.worker_threads == 0 {
            return Err(ZeroerError::ConfigValidation(
                "runtime.worker_threads must be at least 1".into(),
            ));
        }

        if self.matcher.needs_self_join()
            && (self.dataset.left_features.is_none() || self.dataset.right_features.is_none())
        {
            return Err(ZeroerError::ConfigValidation(
                "run_transitivity requires dataset.left_features and dataset.right_features \
                 unless lr_dup_free or lr_identical is set"
                    .into(),
            ));
        }

        for (id, rule) in &self.blocking {
            let overlaps: Vec<(&str, usize)> = match rule {
                BlockingRule::CrossProduct => vec![],
                BlockingRule::Overlap { left_column, overlap_size, .. } => {
                    vec![(left_column.as_str(), *overlap_size)]
                }
                BlockingRule::TwoStage { first, second } => vec![
                    (first.left_column.as_str(), first.overlap_size),
                    (second.left_column.as_str(), second.overlap_size),
                ],
            };
            for (column, size) in overlaps {
                if size == 0 {
                    return Err(ZeroerError::ConfigValidation(format!(
                        "blocking '{id}': overlap_size on '{column}' must be at least 1"
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
