use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZeroerError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (threshold out of range, missing file, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Matrix has no rows or no feature columns.
    #[error("{what} is empty: {rows} row(s), {columns} feature column(s)")]
    EmptyMatrix {
        what: String,
        rows: usize,
        columns: usize,
    },
    /// Row/column counts that must agree do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// The pair identity table is absent or does not cover the matrix.
    #[error("missing identity table: {0}")]
    MissingIdentityTable(String),
    /// A feature value is still outside [0,1] after normalization.
    #[error("feature '{column}', row {row}: value {value} is outside [0,1] after normalization")]
    InputRange {
        column: String,
        row: usize,
        value: f64,
    },
    /// Main and self-join matrices share no feature column.
    #[error("no feature column is shared by the main and self-join matrices (main: {main:?}, left: {left:?}, right: {right:?})")]
    InconsistentFeatureSet {
        main: Vec<String>,
        left: Vec<String>,
        right: Vec<String>,
    },
    /// Missing required column in an input CSV.
    #[error("{source_name}: missing column '{column}'")]
    MissingColumn { source_name: String, column: String },
    /// A CSV cell could not be parsed.
    #[error("{source_name}, row {row}, column '{column}': cannot parse '{value}'")]
    ValueParse {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },
    /// IO error (file read, CSV framing, thread pool setup, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl ZeroerError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "config_parse",
            Self::ConfigValidation(_) => "config_validation",
            Self::EmptyMatrix { .. } => "empty_matrix",
            Self::ShapeMismatch(_) => "shape_mismatch",
            Self::MissingIdentityTable(_) => "missing_identity_table",
            Self::InputRange { .. } => "input_range",
            Self::InconsistentFeatureSet { .. } => "inconsistent_feature_set",
            Self::MissingColumn { .. } => "missing_column",
            Self::ValueParse { .. } => "value_parse",
            Self::Io(_) => "io",
        }
    }

    /// Attach the pipeline stage this error surfaced in.
    pub fn at(self, stage: Stage) -> PipelineError {
        PipelineError { stage, source: self }
    }
}

impl From<csv::Error> for ZeroerError {
    fn from(e: csv::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<std::io::Error> for ZeroerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Stage tagging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loading,
    Normalization,
    Initialization,
    Em,
    Transitivity,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Normalization => write!(f, "normalization"),
            Self::Initialization => write!(f, "initialization"),
            Self::Em => write!(f, "em"),
            Self::Transitivity => write!(f, "transitivity"),
        }
    }
}

/// A failed run: which error kind, and at which stage it occurred.
#[derive(Debug, Error)]
#[error("{stage} failed ({kind}): {source}", kind = .source.kind())]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ZeroerError,
}
