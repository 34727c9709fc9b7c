use std::path::PathBuf;

use zeroer_core::block::{Blocker, BlockerRegistry, Table};
use zeroer_core::config::ZeroerConfig;
use zeroer_core::diagnose::diagnose;
use zeroer_core::engine::{effective_schema, run};
use zeroer_core::load::{load_feature_csv, load_predictions_csv, write_predictions_csv};
use zeroer_core::metrics::{gold_from_matches, threshold_sweep, SWEEP_THRESHOLDS};
use zeroer_core::model::{CandidatePair, MatchInput, MatchOutcome, PairDataset};
use zeroer_core::{MatcherConfig, RuntimeConfig, Stage};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn load(name: &str) -> PairDataset {
    load_feature_csv(name, &read(name)).unwrap()
}

fn project() -> ZeroerConfig {
    ZeroerConfig::from_toml(&read("restaurants.zeroer.toml")).unwrap()
}

fn load_input(config: &ZeroerConfig) -> MatchInput {
    MatchInput {
        main: load(&config.dataset.features),
        left_self: config.dataset.left_features.as_deref().map(load),
        right_self: config.dataset.right_features.as_deref().map(load),
    }
}

fn run_with(matcher: &MatcherConfig) -> MatchOutcome {
    let config = project();
    run(&config.name, matcher, &config.runtime, load_input(&config)).unwrap()
}

fn prediction<'a>(outcome: &'a MatchOutcome, left: &str, right: &str) -> &'a zeroer_core::PairPrediction {
    outcome
        .pairs
        .iter()
        .find(|p| p.left_id == left && p.right_id == right)
        .unwrap_or_else(|| panic!("no pair ({left}, {right})"))
}

// -------------------------------------------------------------------------
// Matching
// -------------------------------------------------------------------------

#[test]
fn plain_em_separates_clear_matches() {
    let matcher = MatcherConfig {
        run_transitivity: false,
        ..project().matcher
    };
    let outcome = run_with(&matcher);

    assert_eq!(outcome.meta.config_name, "Restaurants");
    assert!(!outcome.meta.transitivity_applied);
    assert!(!outcome.meta.rescaled);
    assert!(outcome.fit.converged);
    assert_eq!(outcome.pairs.len(), 22);
    assert_eq!(outcome.seed.positives, 4);

    for (l, r) in [("a1", "b1"), ("a3", "b3"), ("a5", "b5"), ("a7", "b7")] {
        assert!(prediction(&outcome, l, r).is_match, "({l}, {r})");
    }
    // Weak evidence on its own.
    assert!(!prediction(&outcome, "a2", "b1").is_match);
    assert!(!prediction(&outcome, "a7", "b8").is_match);

    let q = outcome.quality.as_ref().unwrap();
    assert_eq!(q.true_positives, 4);
    assert_eq!(q.false_positives, 0);
    assert_eq!(q.false_negatives, 2);
}

#[test]
fn transitivity_propagates_duplicate_groups() {
    let outcome = run_with(&project().matcher);

    assert!(outcome.meta.transitivity_applied);
    let t = outcome.transitivity.as_ref().unwrap();
    assert_eq!(t.left_classes, 1);
    assert_eq!(t.right_classes, 1);
    assert_eq!(t.adjusted_rows, 2);

    // phone_sim only exists in the left self-join and is dropped.
    let names: Vec<&str> = outcome.schema.names().iter().map(String::as_str).collect();
    assert_eq!(names, vec!["addr_lev", "city_exact", "name_jac"]);

    // a2 duplicates a1; b8 duplicates b7.
    assert!(prediction(&outcome, "a2", "b1").is_match);
    assert!(prediction(&outcome, "a7", "b8").is_match);
    assert_eq!(
        prediction(&outcome, "a1", "b1").probability,
        prediction(&outcome, "a2", "b1").probability
    );

    let q = outcome.quality.as_ref().unwrap();
    assert_eq!(q.recall, 1.0);
    assert_eq!(q.precision, 1.0);
}

#[test]
fn lr_dup_free_skips_self_joins() {
    let matcher = MatcherConfig {
        lr_dup_free: true,
        ..project().matcher
    };
    let skipped = run_with(&matcher);
    assert!(skipped.transitivity.is_none());

    let plain = run_with(&MatcherConfig {
        run_transitivity: false,
        ..project().matcher
    });
    assert_eq!(skipped.probabilities(), plain.probabilities());
}

#[test]
fn output_does_not_depend_on_worker_count() {
    let config = project();
    let one = run(
        &config.name,
        &config.matcher,
        &RuntimeConfig { worker_threads: 1 },
        load_input(&config),
    )
    .unwrap();
    let four = run(
        &config.name,
        &config.matcher,
        &RuntimeConfig { worker_threads: 4 },
        load_input(&config),
    )
    .unwrap();
    assert_eq!(one.probabilities(), four.probabilities());
}

#[test]
fn hard_mode_outputs_binary_probabilities() {
    let matcher = MatcherConfig {
        hard: true,
        ..project().matcher
    };
    let outcome = run_with(&matcher);
    assert!(outcome.meta.hard);
    for p in &outcome.pairs {
        assert!(p.probability == 0.0 || p.probability == 1.0, "{}", p.probability);
    }
}

#[test]
fn out_of_range_features_are_rescaled() {
    let data = "ltable_id,rtable_id,sim,votes\n\
                a1,b1,0.9,120\n\
                a2,b2,0.95,140\n\
                a1,b2,0.1,3\n\
                a2,b1,0.05,0\n";
    let main = load_feature_csv("raw.csv", data).unwrap();
    let outcome = run(
        "raw",
        &MatcherConfig::default(),
        &RuntimeConfig::default(),
        MatchInput {
            main,
            left_self: None,
            right_self: None,
        },
    )
    .unwrap();
    assert!(outcome.meta.rescaled);
    let matches: Vec<bool> = outcome.pairs.iter().map(|p| p.is_match).collect();
    assert_eq!(matches, vec![true, true, false, false]);
}

#[test]
fn non_finite_feature_fails_at_normalization() {
    let data = "ltable_id,rtable_id,sim\na1,b1,0.9\na2,b2,inf\n";
    let main = load_feature_csv("bad.csv", data).unwrap();
    let err = run(
        "bad",
        &MatcherConfig::default(),
        &RuntimeConfig::default(),
        MatchInput {
            main,
            left_self: None,
            right_self: None,
        },
    )
    .unwrap_err();
    assert_eq!(err.stage, Stage::Normalization);
    assert_eq!(err.source.kind(), "input_range");
}

#[test]
fn outcome_json_shape() {
    let outcome = run_with(&project().matcher);
    let json: serde_json::Value = serde_json::from_str(&outcome.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["meta"]["config_name"], "Restaurants");
    assert!(json["fit"]["parameters"]["features"].is_array());
    assert_eq!(json["pairs"].as_array().unwrap().len(), 22);
    assert!(json["quality"]["f1"].is_number());
    assert!(json["transitivity"]["left_fit"]["iterations"].is_number());
}

// -------------------------------------------------------------------------
// Schema, predictions, evaluation
// -------------------------------------------------------------------------

#[test]
fn effective_schema_matches_run() {
    let config = project();
    let input = load_input(&config);
    let schema = effective_schema(&config.matcher, &input).unwrap();
    let outcome = run(&config.name, &config.matcher, &config.runtime, input).unwrap();
    assert_eq!(schema, outcome.schema);
}

#[test]
fn predictions_round_trip_through_evaluation() {
    let outcome = run_with(&project().matcher);
    let mut buf = Vec::new();
    write_predictions_csv(&outcome, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("ltable_id,rtable_id,pred\n"));

    let (pairs, preds) = load_predictions_csv("pred.csv", &text).unwrap();
    assert_eq!(preds, outcome.probabilities());

    let matches = vec![
        CandidatePair::new("a1", "b1"),
        CandidatePair::new("a2", "b1"),
        CandidatePair::new("a3", "b3"),
        CandidatePair::new("a5", "b5"),
        CandidatePair::new("a7", "b7"),
        CandidatePair::new("a7", "b8"),
    ];
    let (gold, missing) = gold_from_matches(&pairs, &matches);
    assert_eq!(missing, 0);
    let sweep = threshold_sweep(&gold, &preds, &SWEEP_THRESHOLDS);
    assert_eq!(sweep.actual_positives, 6);
    assert_eq!(sweep.best.unwrap().f1, 1.0);
}

// -------------------------------------------------------------------------
// Diagnostics and blocking
// -------------------------------------------------------------------------

#[test]
fn diagnose_fixture() {
    let report = diagnose(&load("candset_features.csv"), 0.8);
    assert_eq!(report.rows, 22);
    assert_eq!(report.features, 3);
    assert_eq!(report.non_finite_values, 0);
    assert!(report.constant_features.is_empty());
    assert_eq!(report.seed.as_ref().unwrap().positives, 4);
    let gold = report.gold.as_ref().unwrap();
    assert_eq!(gold.positives, 6);
    // 4 seed positives and a high gold ratio are both reported.
    assert!(!report.is_clean());
}

#[test]
fn blocking_from_config() {
    let config = project();
    let registry = BlockerRegistry::from_rules(&config.blocking);
    let blocker = registry.get("restaurants").unwrap();

    let left = Table::from_csv("left_table.csv", &read("left_table.csv")).unwrap();
    let right = Table::from_csv("right_table.csv", &read("right_table.csv")).unwrap();

    let pairs: Vec<(String, String)> = blocker
        .block(&left, &right)
        .into_iter()
        .map(|p| (p.left_id, p.right_id))
        .collect();
    let expected: Vec<(String, String)> = [
        ("a1", "b1"),
        ("a1", "b4"),
        ("a2", "b1"),
        ("a2", "b4"),
        ("a3", "b2"),
        ("a4", "b3"),
    ]
    .iter()
    .map(|(l, r)| (l.to_string(), r.to_string()))
    .collect();
    assert_eq!(pairs, expected);

    let self_pairs = blocker.block_self(&left);
    assert_eq!(
        self_pairs,
        vec![CandidatePair::new("a1", "a2"), CandidatePair::new("a2", "a1")]
    );
}
