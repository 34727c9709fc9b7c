// zeroer CLI - unsupervised entity matching over pair similarity features

mod block;
mod diagnose;
mod evaluate;
mod exit_codes;
mod run;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zeroer_core::{PipelineError, ZeroerError};

use exit_codes::{exit_code_for, hint_for, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "zeroer")]
#[command(about = "Unsupervised entity matching: EM over pair similarity features")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log more to stderr (-v info, -vv debug). RUST_LOG wins when no -v is given.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the matcher on a project's feature files and write predictions
    #[command(after_help = "\
Examples:
  zeroer run fodors_zagats.zeroer.toml
  zeroer run fodors_zagats.zeroer.toml --json > outcome.json
  zeroer run beer.zeroer.toml --output pred.csv --c-bay 0.02
  zeroer run dblp_acm.zeroer.toml --transitivity --threads 4")]
    Run {
        /// Path to the .zeroer.toml project file
        config: PathBuf,

        /// Print the full outcome as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Predictions CSV (overrides dataset.output)
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: run::Overrides,
    },

    /// Check a project file and its feature files without fitting
    #[command(after_help = "\
Project file layout:
  name = \"Fodors-Zagats\"
  [matcher]            init_threshold, c_bay, hard, run_transitivity,
                       LR_dup_free, LR_identical, max_iterations,
                       convergence_epsilon, match_threshold
  [runtime]            worker_threads
  [dataset]            features, left_features, right_features, output
  [blocking.<id>]      strategy = cross_product | overlap | two_stage

Examples:
  zeroer validate fodors_zagats.zeroer.toml")]
    Validate {
        /// Path to the .zeroer.toml project file
        config: PathBuf,
    },

    /// Report data-quality problems in a feature file
    #[command(after_help = "\
Examples:
  zeroer diagnose candset_features.csv
  zeroer diagnose candset_features.csv --init-threshold 0.7 --json")]
    Diagnose {
        /// Feature CSV (ltable_id, rtable_id, [gold], features...)
        features: PathBuf,

        /// Seed threshold to check
        #[arg(long, default_value_t = 0.8)]
        init_threshold: f64,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Generate candidate pairs with a dataset's blocking rule
    #[command(after_help = "\
Examples:
  zeroer block beer.zeroer.toml beer tableA.csv tableB.csv --output candset.csv
  zeroer block beer.zeroer.toml beer tableA.csv --self-join")]
    Block {
        /// Path to the .zeroer.toml project file
        config: PathBuf,

        /// Dataset id under [blocking.<id>]
        dataset: String,

        /// Left table CSV (needs an `id` column)
        left: PathBuf,

        /// Right table CSV (needs an `id` column). Omit with --self-join.
        #[arg(required_unless_present = "self_join")]
        right: Option<PathBuf>,

        /// Block the left table against itself, without identity pairs
        #[arg(long)]
        self_join: bool,

        /// Write pairs here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score a predictions file against known matches over several thresholds
    #[command(after_help = "\
Examples:
  zeroer evaluate pred.csv matches.csv
  zeroer evaluate pred.csv matches.csv --json")]
    Evaluate {
        /// Predictions CSV (ltable_id, rtable_id, pred)
        predictions: PathBuf,

        /// Known matches CSV (ltable_id, rtable_id)
        matches: PathBuf,

        /// Print the sweep as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  zeroer-core ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
        "\nprofile: ", env!("ZEROER_BUILD_PROFILE"),
    )
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            json,
            output,
            overrides,
        } => run::cmd_run(config, json, output, overrides),
        Commands::Validate { config } => run::cmd_validate(config),
        Commands::Diagnose {
            features,
            init_threshold,
            json,
        } => diagnose::cmd_diagnose(features, init_threshold, json),
        Commands::Block {
            config,
            dataset,
            left,
            right,
            self_join,
            output,
        } => block::cmd_block(config, dataset, left, right, self_join, output),
        Commands::Evaluate {
            predictions,
            matches,
            json,
        } => evaluate::cmd_evaluate(predictions, matches, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }
}

impl From<ZeroerError> for CliError {
    fn from(err: ZeroerError) -> Self {
        Self {
            code: exit_code_for(&err),
            hint: hint_for(&err).map(str::to_string),
            message: err.to_string(),
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        Self {
            code: exit_code_for(&err.source),
            hint: hint_for(&err.source).map(str::to_string),
            message: err.to_string(),
        }
    }
}
