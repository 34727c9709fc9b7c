//! `zeroer run` / `zeroer validate`: config-driven matching.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::debug;
use zeroer_core::engine::effective_schema;
use zeroer_core::load::{load_feature_csv, write_predictions_csv};
use zeroer_core::{MatchInput, MatchOutcome, PairDataset, ZeroerConfig};

use crate::util::{read_file, resolve, source_name, write_file};
use crate::CliError;

/// Command-line overrides for `[matcher]` and `[runtime]` values.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Seed threshold on the rescaled row sum, in (0, 1)
    #[arg(long)]
    pub init_threshold: Option<f64>,

    /// Regularization strength, in [0, 0.1]
    #[arg(long)]
    pub c_bay: Option<f64>,

    /// Hard EM: binarize posteriors after every E-step
    #[arg(long)]
    pub hard: bool,

    /// Reconcile with within-table duplicate groups
    #[arg(long)]
    pub transitivity: bool,

    /// Left and right tables hold no internal duplicates
    #[arg(long)]
    pub lr_dup_free: bool,

    /// Left and right are the same table
    #[arg(long)]
    pub lr_identical: bool,

    /// EM iteration cap
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Worker threads for the E-step
    #[arg(long, env = "ZEROER_THREADS")]
    pub threads: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut ZeroerConfig) {
        let m = &mut config.matcher;
        if let Some(v) = self.init_threshold {
            m.init_threshold = v;
        }
        if let Some(v) = self.c_bay {
            m.c_bay = v;
        }
        if let Some(v) = self.max_iterations {
            m.max_iterations = v;
        }
        m.hard |= self.hard;
        m.run_transitivity |= self.transitivity;
        m.lr_dup_free |= self.lr_dup_free;
        m.lr_identical |= self.lr_identical;
        if let Some(v) = self.threads {
            config.runtime.worker_threads = v;
        }
    }
}

fn load_config(config_path: &Path, overrides: &Overrides) -> Result<ZeroerConfig, CliError> {
    let config_str = read_file(config_path)?;
    let mut config = ZeroerConfig::from_toml(&config_str)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn load_dataset(config_path: &Path, file: &str) -> Result<PairDataset, CliError> {
    let path = resolve(config_path, file);
    debug!(path = %path.display(), "loading feature file");
    let data = read_file(&path)?;
    Ok(load_feature_csv(&source_name(&path), &data)?)
}

/// Main feature file plus the self-join files the run actually needs.
fn load_input(config_path: &Path, config: &ZeroerConfig) -> Result<MatchInput, CliError> {
    let main = load_dataset(config_path, &config.dataset.features)?;
    let (left_self, right_self) = if config.matcher.needs_self_join() {
        let load = |file: &Option<String>| {
            file.as_deref()
                .map(|f| load_dataset(config_path, f))
                .transpose()
        };
        (load(&config.dataset.left_features)?, load(&config.dataset.right_features)?)
    } else {
        (None, None)
    };
    Ok(MatchInput {
        main,
        left_self,
        right_self,
    })
}

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    overrides: Overrides,
) -> Result<(), CliError> {
    let config = load_config(&config_path, &overrides)?;
    let input = load_input(&config_path, &config)?;

    let outcome = zeroer_core::run(&config.name, &config.matcher, &config.runtime, input)?;

    let pred_path = output_file.or_else(|| {
        config
            .dataset
            .output
            .as_deref()
            .map(|f| resolve(&config_path, f))
    });
    if let Some(ref path) = pred_path {
        let mut buf = Vec::new();
        write_predictions_csv(&outcome, &mut buf)?;
        write_file(path, &buf)?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{}", outcome.to_json_pretty()?);
    }

    print_summary(&outcome);
    Ok(())
}

/// Human summary to stderr.
fn print_summary(outcome: &MatchOutcome) {
    let matches = outcome.pairs.iter().filter(|p| p.is_match).count();
    let fit = &outcome.fit;
    eprintln!(
        "{}: {} of {} pairs matched ({} features, {} seed positives, {} iterations{})",
        outcome.meta.config_name,
        matches,
        outcome.pairs.len(),
        outcome.schema.len(),
        outcome.seed.positives,
        fit.iterations,
        if fit.converged { "" } else { ", not converged" },
    );
    if outcome.meta.diagonal_rows_removed > 0 {
        eprintln!("identity pairs removed: {}", outcome.meta.diagonal_rows_removed);
    }
    if let Some(ref t) = outcome.transitivity {
        eprintln!(
            "transitivity: {} left / {} right duplicate groups, {} pairs adjusted",
            t.left_classes, t.right_classes, t.adjusted_rows
        );
    }
    if let Some(ref q) = outcome.quality {
        eprintln!(
            "quality @ {}: precision {:.4}, recall {:.4}, F1 {:.4} (TP {}, FP {}, FN {})",
            q.threshold,
            q.precision,
            q.recall,
            q.f1,
            q.true_positives,
            q.false_positives,
            q.false_negatives
        );
    }
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path, &Overrides::default())?;
    let input = load_input(&config_path, &config)?;
    let schema = effective_schema(&config.matcher, &input)?;

    eprintln!(
        "{}: ok ({} pairs, {} features used{})",
        config.name,
        input.main.pairs.len(),
        schema.len(),
        if config.matcher.needs_self_join() {
            ", transitivity on"
        } else {
            ""
        },
    );
    if !config.blocking.is_empty() {
        let ids: Vec<&str> = config.blocking.keys().map(String::as_str).collect();
        eprintln!("blocking rules: {}", ids.join(", "));
    }
    Ok(())
}
