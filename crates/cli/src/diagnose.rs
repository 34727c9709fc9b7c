//! `zeroer diagnose`: data-quality report for a feature file.

use std::path::PathBuf;

use zeroer_core::diagnose::{diagnose, DiagnosticReport};
use zeroer_core::load::load_feature_csv;

use crate::util::{read_file, source_name};
use crate::CliError;

pub fn cmd_diagnose(features: PathBuf, init_threshold: f64, json_output: bool) -> Result<(), CliError> {
    if !(init_threshold > 0.0 && init_threshold < 1.0) {
        return Err(CliError::usage(format!(
            "--init-threshold must be in (0, 1), got {init_threshold}"
        )));
    }
    let data = read_file(&features)?;
    let dataset = load_feature_csv(&source_name(&features), &data)?;
    let report = diagnose(&dataset, init_threshold);

    if json_output {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(r: &DiagnosticReport) {
    println!("pairs:     {}", r.rows);
    println!("features:  {}", r.features);
    if let Some(ref s) = r.stats {
        println!(
            "values:    min {:.4}, max {:.4}, mean {:.4}, std {:.4}",
            s.min, s.max, s.mean, s.std_dev
        );
    }
    if let Some(ref seed) = r.seed {
        println!(
            "seed:      {} positive / {} negative at {} ({:.2}%)",
            seed.positives,
            seed.negatives,
            seed.threshold,
            seed.positive_fraction * 100.0
        );
    }
    match r.gold {
        Some(ref g) => println!("gold:      {} positive ({:.2}%)", g.positives, g.positive_ratio * 100.0),
        None => println!("gold:      none"),
    }
    if r.is_clean() {
        println!("no issues found");
    } else {
        println!("issues:");
        for w in &r.warnings {
            println!("  - {w}");
        }
    }
}
