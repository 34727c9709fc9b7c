//! `zeroer evaluate`: threshold sweep of a predictions file against known matches.

use std::path::PathBuf;

use zeroer_core::load::{load_pairs_csv, load_predictions_csv};
use zeroer_core::metrics::{gold_from_matches, threshold_sweep, ThresholdSweep, SWEEP_THRESHOLDS};

use crate::util::{read_file, source_name};
use crate::CliError;

pub fn cmd_evaluate(predictions: PathBuf, matches: PathBuf, json_output: bool) -> Result<(), CliError> {
    let (pairs, probs) = load_predictions_csv(&source_name(&predictions), &read_file(&predictions)?)?;
    if pairs.is_empty() {
        return Err(CliError::general(format!("{}: no predictions", predictions.display())));
    }
    let known = load_pairs_csv(&source_name(&matches), &read_file(&matches)?)?;

    let (gold, missing) = gold_from_matches(&pairs, &known);
    if missing > 0 {
        eprintln!("{missing} known match(es) are not among the predicted pairs (lost in blocking)");
    }

    let sweep = threshold_sweep(&gold, &probs, &SWEEP_THRESHOLDS);

    if json_output {
        let json = serde_json::to_string_pretty(&sweep)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    } else {
        print_sweep(&sweep);
    }
    Ok(())
}

fn print_sweep(sweep: &ThresholdSweep) {
    println!("pairs: {}, actual positives: {}", sweep.rows, sweep.actual_positives);
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10}",
        "threshold", "predicted", "precision", "recall", "f1"
    );
    for m in &sweep.results {
        println!(
            "{:<10.2} {:>10} {:>10.4} {:>10.4} {:>10.4}",
            m.threshold, m.predicted_positives, m.precision, m.recall, m.f1
        );
    }
    if let Some(ref best) = sweep.best {
        println!("best: threshold {:.2} (F1 {:.4})", best.threshold, best.f1);
    }
}
