//! `zeroer-core`: Unsupervised entity matching engine.
//!
//! Pure engine crate: receives pre-loaded pair similarity features, fits a
//! two-class EM mixture without labels, returns per-pair match probabilities.
//! No CLI dependencies.

pub mod block;
pub mod config;
pub mod diagnose;
pub mod em;
pub mod engine;
pub mod error;
pub mod load;
pub mod metrics;
pub mod mixture;
pub mod model;
pub mod normalize;
pub mod seed;
pub mod transitivity;

pub use config::{MatcherConfig, RuntimeConfig, ZeroerConfig};
pub use engine::run;
pub use error::{PipelineError, Stage, ZeroerError};
pub use model::{MatchInput, MatchOutcome, PairDataset, PairPrediction};
