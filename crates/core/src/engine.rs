use rayon::ThreadPool;
use tracing::info;

use crate::config::{MatcherConfig, RuntimeConfig};
use crate::em::{self, EmFit, EmSettings};
use crate::error::{PipelineError, Stage, ZeroerError};
use crate::metrics;
use crate::model::{
    FeatureMatrix, FeatureSchema, MatchInput, MatchMeta, MatchOutcome, PairDataset, PairPrediction,
    SeedSummary, TransitivitySummary,
};
use crate::normalize::normalize;
use crate::seed;
use crate::transitivity::{align_schemas, reconcile, EquivalenceClasses};

/// Run matching per config. Returns per-pair probabilities plus fit summaries.
///
/// Ground truth on `input.main` is only scored against the final result.
pub fn run(
    name: &str,
    config: &MatcherConfig,
    runtime: &RuntimeConfig,
    input: MatchInput,
) -> Result<MatchOutcome, PipelineError> {
    config.validate().map_err(|e| e.at(Stage::Loading))?;
    let pool = build_pool(runtime).map_err(|e| e.at(Stage::Loading))?;
    let settings = EmSettings::from(config);

    let MatchInput {
        main,
        left_self,
        right_self,
    } = input;

    let (mut main, diagonal_rows_removed) = if config.lr_identical {
        let (main, removed) = main.without_diagonal();
        info!(removed, remaining = main.pairs.len(), "removed identity pairs (lr_identical)");
        (main, removed)
    } else {
        (main, 0)
    };

    // Self-join datasets, projected onto the shared schema, when transitivity applies.
    let self_joins = if config.needs_self_join() {
        let (left, right) = match (left_self, right_self) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(ZeroerError::ConfigValidation(
                    "transitivity requires both left and right self-join matrices".into(),
                )
                .at(Stage::Transitivity))
            }
        };
        let schema = align_schemas(
            main.features.schema(),
            left.features.schema(),
            right.features.schema(),
        )
        .map_err(|e| e.at(Stage::Transitivity))?;
        main = main.project(&schema).map_err(|e| e.at(Stage::Transitivity))?;
        let left = left.project(&schema).map_err(|e| e.at(Stage::Transitivity))?;
        let right = right.project(&schema).map_err(|e| e.at(Stage::Transitivity))?;
        Some((left, right))
    } else {
        if config.run_transitivity {
            info!(
                lr_dup_free = config.lr_dup_free,
                lr_identical = config.lr_identical,
                "transitivity skipped: no within-table duplicates to reconcile"
            );
        }
        None
    };

    let schema = main.features.schema().clone();
    let main_pass = fit_pass(main.features, config, &settings, &pool, "features")?;
    let mut posteriors = main_pass.fit.posteriors.clone();

    let transitivity = match self_joins {
        Some((left, right)) => {
            let (left_fit, left_classes) = fit_self_join(left, config, &settings, &pool, "left self-join")?;
            let (right_fit, right_classes) =
                fit_self_join(right, config, &settings, &pool, "right self-join")?;

            let (unified, adjusted_rows) =
                reconcile(&main.pairs, &posteriors, &left_classes, &right_classes);
            info!(
                left_classes = left_classes.class_count(),
                right_classes = right_classes.class_count(),
                adjusted_rows,
                "transitivity applied"
            );
            posteriors = unified;

            Some(TransitivitySummary {
                left_classes: left_classes.class_count(),
                right_classes: right_classes.class_count(),
                adjusted_rows,
                left_fit: left_fit.as_ref().map(EmFit::summary),
                right_fit: right_fit.as_ref().map(EmFit::summary),
            })
        }
        None => None,
    };

    let pairs: Vec<PairPrediction> = main
        .pairs
        .iter()
        .zip(posteriors.as_slice())
        .map(|(pair, &p)| PairPrediction {
            left_id: pair.left_id.clone(),
            right_id: pair.right_id.clone(),
            probability: p,
            is_match: p > config.match_threshold,
        })
        .collect();

    let quality = main.gold.as_ref().map(|gold| {
        let q = metrics::evaluate(gold, posteriors.as_slice(), config.match_threshold);
        info!(
            precision = q.precision,
            recall = q.recall,
            f1 = q.f1,
            threshold = q.threshold,
            "quality against gold"
        );
        q
    });

    info!(
        pairs = pairs.len(),
        matches = pairs.iter().filter(|p| p.is_match).count(),
        "matching complete"
    );

    Ok(MatchOutcome {
        meta: MatchMeta {
            config_name: name.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            hard: config.hard,
            rescaled: main_pass.rescaled,
            diagonal_rows_removed,
            transitivity_applied: transitivity.is_some(),
        },
        schema,
        seed: main_pass.seed,
        fit: main_pass.fit.summary(),
        transitivity,
        quality,
        pairs,
    })
}

/// The E-step pool. Its size never changes results.
pub fn build_pool(runtime: &RuntimeConfig) -> Result<ThreadPool, ZeroerError> {
    if runtime.worker_threads == 0 {
        return Err(ZeroerError::ConfigValidation(
            "runtime.worker_threads must be at least 1".into(),
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(runtime.worker_threads)
        .thread_name(|i| format!("zeroer-em-{i}"))
        .build()
        .map_err(|e| ZeroerError::Io(format!("cannot start worker pool: {e}")))
}

struct Pass {
    fit: EmFit,
    seed: SeedSummary,
    rescaled: bool,
}

/// Normalizer -> seed -> EM on one matrix.
fn fit_pass(
    features: FeatureMatrix,
    config: &MatcherConfig,
    settings: &EmSettings,
    pool: &ThreadPool,
    what: &str,
) -> Result<Pass, PipelineError> {
    info!(what, rows = features.n_rows(), features = features.n_features(), "fitting");
    let normalized = normalize(features, what).map_err(|e| e.at(Stage::Normalization))?;
    let seed_labels = seed::initialize(&normalized.matrix, config.init_threshold);
    let seed = seed::summarize(&seed_labels, what);
    let fit = em::fit(&normalized.matrix, seed_labels, settings, pool, what);
    Ok(Pass {
        fit,
        seed,
        rescaled: normalized.rescaled,
    })
}

fn fit_self_join(
    dataset: PairDataset,
    config: &MatcherConfig,
    settings: &EmSettings,
    pool: &ThreadPool,
    what: &str,
) -> Result<(Option<EmFit>, EquivalenceClasses), PipelineError> {
    let (dataset, removed) = dataset.without_diagonal();
    if removed > 0 {
        info!(what, removed, "removed identity pairs");
    }
    if dataset.pairs.is_empty() {
        info!(what, "self-join holds only identity pairs; no duplicate groups");
        return Ok((None, EquivalenceClasses::default()));
    }
    let pass = fit_pass(dataset.features, config, settings, pool, what)?;
    let classes =
        EquivalenceClasses::from_self_join(&dataset.pairs, &pass.fit.posteriors, config.match_threshold);
    Ok((Some(pass.fit), classes))
}

/// Schema every matrix would be fitted on, without fitting.
pub fn effective_schema(config: &MatcherConfig, input: &MatchInput) -> Result<FeatureSchema, PipelineError> {
    let main = input.main.features.schema();
    if !config.needs_self_join() {
        return Ok(main.clone());
    }
    match (&input.left_self, &input.right_self) {
        (Some(l), Some(r)) => align_schemas(main, l.features.schema(), r.features.schema())
            .map_err(|e| e.at(Stage::Transitivity)),
        _ => Err(ZeroerError::ConfigValidation(
            "transitivity requires both left and right self-join matrices".into(),
        )
        .at(Stage::Transitivity)),
    }
}
