//! CSV readers and writers for feature files, match lists and predictions.
//!
//! Readers take the file contents as a string; the caller owns file IO.

use std::io::Write;

use crate::error::ZeroerError;
use crate::model::{CandidatePair, FeatureMatrix, FeatureSchema, MatchOutcome, PairDataset, PairTable};

const LEFT_ID: &str = "ltable_id";
const RIGHT_ID: &str = "rtable_id";
const GOLD: &str = "gold";
const PRED: &str = "pred";
/// Index column written by dataframe exports.
const INDEX: &str = "_id";

/// Load `ltable_id,rtable_id,[gold],feature...` into a dataset.
///
/// An `_id` or unnamed column is ignored. A `gold` column that is all zeros is
/// treated as absent.
pub fn load_feature_csv(source_name: &str, data: &str) -> Result<PairDataset, ZeroerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let left_col = require(&headers, LEFT_ID, source_name)?;
    let right_col = require(&headers, RIGHT_ID, source_name)?;
    let gold_col = headers.iter().position(|h| h == GOLD);

    let feature_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| {
            *i != left_col
                && *i != right_col
                && Some(*i) != gold_col
                && !h.is_empty()
                && h.as_str() != INDEX
        })
        .map(|(i, _)| i)
        .collect();
    let schema = FeatureSchema::new(feature_cols.iter().map(|&i| headers[i].clone()).collect());

    let mut pairs = Vec::new();
    let mut values = Vec::new();
    let mut gold = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = result?;
        // 1-based data row number, header excluded.
        let line = row_idx + 1;
        let cell = |i: usize| row.get(i).unwrap_or_default().trim();

        pairs.push(CandidatePair::new(cell(left_col), cell(right_col)));

        for &i in &feature_cols {
            let raw = cell(i);
            let v: f64 = raw.parse().map_err(|_| ZeroerError::ValueParse {
                source_name: source_name.to_string(),
                row: line,
                column: headers[i].clone(),
                value: raw.to_string(),
            })?;
            values.push(v);
        }

        if let Some(g) = gold_col {
            gold.push(parse_label(source_name, line, &headers[g], cell(g))?);
        }
    }

    let rows = pairs.len();
    let features = FeatureMatrix::new(schema, rows, values)?;
    let gold = (gold_col.is_some() && gold.iter().any(|&g| g == 1)).then_some(gold);
    PairDataset::new(PairTable::new(pairs), features, gold)
}

/// Read `ltable_id,rtable_id` pairs (extra columns ignored).
pub fn load_pairs_csv(source_name: &str, data: &str) -> Result<Vec<CandidatePair>, ZeroerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let left_col = require(&headers, LEFT_ID, source_name)?;
    let right_col = require(&headers, RIGHT_ID, source_name)?;

    let mut pairs = Vec::new();
    for result in reader.records() {
        let row = result?;
        pairs.push(CandidatePair::new(
            row.get(left_col).unwrap_or_default().trim(),
            row.get(right_col).unwrap_or_default().trim(),
        ));
    }
    Ok(pairs)
}

/// Read a predictions file written by [`write_predictions_csv`].
pub fn load_predictions_csv(source_name: &str, data: &str) -> Result<(PairTable, Vec<f64>), ZeroerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let left_col = require(&headers, LEFT_ID, source_name)?;
    let right_col = require(&headers, RIGHT_ID, source_name)?;
    let pred_col = require(&headers, PRED, source_name)?;

    let mut pairs = Vec::new();
    let mut preds = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = result?;
        let raw = row.get(pred_col).unwrap_or_default().trim();
        let p: f64 = raw.parse().map_err(|_| ZeroerError::ValueParse {
            source_name: source_name.to_string(),
            row: row_idx + 1,
            column: PRED.into(),
            value: raw.to_string(),
        })?;
        pairs.push(CandidatePair::new(
            row.get(left_col).unwrap_or_default().trim(),
            row.get(right_col).unwrap_or_default().trim(),
        ));
        preds.push(p);
    }
    Ok((PairTable::new(pairs), preds))
}

/// Write `ltable_id,rtable_id,pred`, one row per pair, in outcome order.
pub fn write_predictions_csv<W: Write>(outcome: &MatchOutcome, writer: W) -> Result<(), ZeroerError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([LEFT_ID, RIGHT_ID, PRED])?;
    for p in &outcome.pairs {
        let pred = p.probability.to_string();
        wtr.write_record([p.left_id.as_str(), p.right_id.as_str(), pred.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn require(headers: &[String], column: &str, source_name: &str) -> Result<usize, ZeroerError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| ZeroerError::MissingColumn {
            source_name: source_name.to_string(),
            column: column.to_string(),
        })
}

fn parse_label(source_name: &str, row: usize, column: &str, raw: &str) -> Result<u8, ZeroerError> {
    match raw.parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(ZeroerError::ValueParse {
            source_name: source_name.to_string(),
            row,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: &str = "\
_id,ltable_id,rtable_id,gold,name_jac,addr_lev
0,a1,b1,1,0.9,0.8
1,a1,b2,0,0.1,0.3
2,a2,b2,0,0.2,0.25
";

    #[test]
    fn loads_features_ids_and_gold() {
        let ds = load_feature_csv("features.csv", FEATURES).unwrap();
        assert_eq!(ds.features.schema().names(), &["name_jac".to_string(), "addr_lev".to_string()]);
        assert_eq!(ds.features.n_rows(), 3);
        assert_eq!(ds.features.row(1), &[0.1, 0.3]);
        assert_eq!(ds.pairs.get(2).unwrap(), &CandidatePair::new("a2", "b2"));
        assert_eq!(ds.gold, Some(vec![1, 0, 0]));
    }

    #[test]
    fn unnamed_index_column_is_ignored() {
        let data = ",ltable_id,rtable_id,sim\n0,a,b,0.5\n";
        let ds = load_feature_csv("f.csv", data).unwrap();
        assert_eq!(ds.features.schema().names(), &["sim".to_string()]);
    }

    #[test]
    fn all_zero_gold_is_absent() {
        let data = "ltable_id,rtable_id,gold,sim\na,b,0,0.5\nc,d,0,0.1\n";
        let ds = load_feature_csv("f.csv", data).unwrap();
        assert!(ds.gold.is_none());
    }

    #[test]
    fn missing_id_column_is_reported() {
        let err = load_feature_csv("f.csv", "ltable_id,sim\na,0.5\n").unwrap_err();
        assert_eq!(err.kind(), "missing_column");
        assert!(err.to_string().contains("rtable_id"));
    }

    #[test]
    fn bad_value_reports_row_and_column() {
        let data = "ltable_id,rtable_id,sim\na,b,0.5\nc,d,high\n";
        match load_feature_csv("f.csv", data).unwrap_err() {
            ZeroerError::ValueParse { row, column, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(column, "sim");
                assert_eq!(value, "high");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gold_must_be_binary() {
        let data = "ltable_id,rtable_id,gold,sim\na,b,2,0.5\n";
        assert_eq!(load_feature_csv("f.csv", data).unwrap_err().kind(), "value_parse");
    }

    #[test]
    fn predictions_read_back() {
        let data = "ltable_id,rtable_id,pred\na1,b1,0.97\na2,b2,0.01\n";
        let (pairs, preds) = load_predictions_csv("pred.csv", data).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(preds, vec![0.97, 0.01]);
    }

    #[test]
    fn match_list_ignores_extra_columns() {
        let data = "ltable_id,rtable_id,note\na1,b1,x\n";
        let pairs = load_pairs_csv("matches.csv", data).unwrap();
        assert_eq!(pairs, vec![CandidatePair::new("a1", "b1")]);
    }
}
