//! Candidate generation: turn two record tables into candidate pairs.
//!
//! Every dataset id maps to one [`Blocker`] value, resolved when the config is
//! loaded. Matching itself never looks at raw records.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::info;

use crate::config::{BlockingRule, OverlapRule};
use crate::error::ZeroerError;
use crate::model::CandidatePair;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl Record {
    /// Field value, `None` when the column is absent or the cell is blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub records: Vec<Record>,
}

impl Table {
    /// Parse a CSV with header. An `id` column is required; every other
    /// column is kept as a named field.
    pub fn from_csv(source_name: &str, data: &str) -> Result<Self, ZeroerError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let id_col = headers
            .iter()
            .position(|h| h == "id")
            .ok_or_else(|| ZeroerError::MissingColumn {
                source_name: source_name.to_string(),
                column: "id".into(),
            })?;

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result?;
            let id = row.get(id_col).unwrap_or_default().trim().to_string();
            let fields = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != id_col)
                .map(|(i, h)| (h.clone(), row.get(i).unwrap_or_default().to_string()))
                .collect();
            records.push(Record { id, fields });
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Blocker contract
// ---------------------------------------------------------------------------

pub trait Blocker: Send + Sync {
    fn block(&self, left: &Table, right: &Table) -> Vec<CandidatePair>;

    /// Block a table against itself, without identity pairs.
    fn block_self(&self, table: &Table) -> Vec<CandidatePair> {
        self.block(table, table)
            .into_iter()
            .filter(|p| !p.is_diagonal())
            .collect()
    }
}

/// Every left record against every right record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossProduct;

impl Blocker for CrossProduct {
    fn block(&self, left: &Table, right: &Table) -> Vec<CandidatePair> {
        let mut out = Vec::with_capacity(left.len() * right.len());
        for l in &left.records {
            for r in &right.records {
                out.push(CandidatePair::new(l.id.as_str(), r.id.as_str()));
            }
        }
        out
    }
}

/// Keep pairs sharing at least `overlap_size` distinct words in the named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapBlocker {
    pub left_column: String,
    pub right_column: String,
    pub overlap_size: usize,
    /// Records with a blank value pair with everything on the other side.
    pub allow_missing: bool,
}

impl From<&OverlapRule> for OverlapBlocker {
    fn from(rule: &OverlapRule) -> Self {
        Self {
            left_column: rule.left_column.clone(),
            right_column: rule.right_column.clone(),
            overlap_size: rule.overlap_size,
            allow_missing: rule.allow_missing,
        }
    }
}

impl OverlapBlocker {
    /// (left index, right index) of surviving pairs, in left-then-right order.
    fn block_indices(&self, left: &Table, right: &Table) -> Vec<(usize, usize)> {
        let right_tokens: Vec<Option<BTreeSet<String>>> = right
            .records
            .iter()
            .map(|r| r.get(&self.right_column).map(tokenize))
            .collect();

        // Inverted index: token -> right rows holding it.
        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut right_missing = Vec::new();
        for (j, tokens) in right_tokens.iter().enumerate() {
            match tokens {
                Some(tokens) => {
                    for t in tokens {
                        index.entry(t.as_str()).or_default().push(j);
                    }
                }
                None => right_missing.push(j),
            }
        }

        let mut out = Vec::new();
        for (i, record) in left.records.iter().enumerate() {
            let Some(value) = record.get(&self.left_column) else {
                if self.allow_missing {
                    out.extend((0..right.len()).map(|j| (i, j)));
                }
                continue;
            };

            let mut shared: BTreeMap<usize, usize> = BTreeMap::new();
            for token in tokenize(value) {
                if let Some(rows) = index.get(token.as_str()) {
                    for &j in rows {
                        *shared.entry(j).or_default() += 1;
                    }
                }
            }
            if self.allow_missing {
                for &j in &right_missing {
                    shared.insert(j, usize::MAX);
                }
            }
            out.extend(
                shared
                    .into_iter()
                    .filter(|&(_, n)| n >= self.overlap_size)
                    .map(|(j, _)| (i, j)),
            );
        }
        out
    }

    /// Whether a single pair survives this rule.
    fn keeps(&self, left: &Record, right: &Record) -> bool {
        match (left.get(&self.left_column), right.get(&self.right_column)) {
            (Some(l), Some(r)) => tokenize(l).intersection(&tokenize(r)).count() >= self.overlap_size,
            _ => self.allow_missing,
        }
    }
}

impl Blocker for OverlapBlocker {
    fn block(&self, left: &Table, right: &Table) -> Vec<CandidatePair> {
        to_pairs(left, right, self.block_indices(left, right))
    }
}

/// Overlap on a first attribute, then filter the survivors with a second rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoStage {
    pub first: OverlapBlocker,
    pub second: OverlapBlocker,
}

impl Blocker for TwoStage {
    fn block(&self, left: &Table, right: &Table) -> Vec<CandidatePair> {
        let stage1 = self.first.block_indices(left, right);
        let before = stage1.len();
        let kept: Vec<(usize, usize)> = stage1
            .into_iter()
            .filter(|&(i, j)| self.second.keeps(&left.records[i], &right.records[j]))
            .collect();
        info!(first = before, second = kept.len(), "two-stage blocking");
        to_pairs(left, right, kept)
    }
}

fn to_pairs(left: &Table, right: &Table, indices: Vec<(usize, usize)>) -> Vec<CandidatePair> {
    indices
        .into_iter()
        .map(|(i, j)| CandidatePair::new(left.records[i].id.as_str(), right.records[j].id.as_str()))
        .collect()
}

/// Lowercased whitespace-separated words with surrounding punctuation stripped.
fn tokenize(value: &str) -> BTreeSet<String> {
    value
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Dataset id -> blocking strategy, built once from config.
#[derive(Default)]
pub struct BlockerRegistry {
    blockers: BTreeMap<String, Box<dyn Blocker>>,
}

impl BlockerRegistry {
    pub fn from_rules(rules: &BTreeMap<String, BlockingRule>) -> Self {
        let blockers = rules
            .iter()
            .map(|(id, rule)| {
                let blocker: Box<dyn Blocker> = match rule {
                    BlockingRule::CrossProduct => Box::new(CrossProduct),
                    BlockingRule::Overlap {
                        left_column,
                        right_column,
                        overlap_size,
                        allow_missing,
                    } => Box::new(OverlapBlocker {
                        left_column: left_column.clone(),
                        right_column: right_column.clone(),
                        overlap_size: *overlap_size,
                        allow_missing: *allow_missing,
                    }),
                    BlockingRule::TwoStage { first, second } => Box::new(TwoStage {
                        first: first.into(),
                        second: second.into(),
                    }),
                };
                (id.clone(), blocker)
            })
            .collect();
        Self { blockers }
    }

    pub fn get(&self, dataset_id: &str) -> Result<&dyn Blocker, ZeroerError> {
        self.blockers
            .get(dataset_id)
            .map(|b| b.as_ref())
            .ok_or_else(|| {
                ZeroerError::ConfigValidation(format!(
                    "no blocking rule for dataset '{dataset_id}' (known: {})",
                    self.ids().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.blockers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BlockerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockerRegistry")
            .field("ids", &self.blockers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT: &str = "\
id,name,city
a1,Arnie Morton's of Chicago,Los Angeles
a2,Art's Delicatessen,Studio City
a3,,Los Angeles
";

    const RIGHT: &str = "\
id,name,city
b1,Arnie Morton's Chicago,Los Angeles
b2,Art's Deli,Studio City
b3,Fenix,Hollywood
";

    fn tables() -> (Table, Table) {
        (
            Table::from_csv("left.csv", LEFT).unwrap(),
            Table::from_csv("right.csv", RIGHT).unwrap(),
        )
    }

    fn ids(pairs: &[CandidatePair]) -> Vec<(&str, &str)> {
        pairs
            .iter()
            .map(|p| (p.left_id.as_str(), p.right_id.as_str()))
            .collect()
    }

    fn overlap(column: &str, size: usize, allow_missing: bool) -> OverlapBlocker {
        OverlapBlocker {
            left_column: column.into(),
            right_column: column.into(),
            overlap_size: size,
            allow_missing,
        }
    }

    #[test]
    fn table_requires_id_column() {
        let err = Table::from_csv("t.csv", "name\nfoo\n").unwrap_err();
        assert_eq!(err.kind(), "missing_column");
    }

    #[test]
    fn blank_cell_reads_as_missing() {
        let (left, _) = tables();
        assert_eq!(left.records[2].get("name"), None);
        assert_eq!(left.records[2].get("city"), Some("Los Angeles"));
        assert_eq!(left.records[2].get("nope"), None);
    }

    #[test]
    fn cross_product_pairs_everything() {
        let (left, right) = tables();
        assert_eq!(CrossProduct.block(&left, &right).len(), 9);
    }

    #[test]
    fn overlap_counts_distinct_words_case_insensitively() {
        let (left, right) = tables();
        let pairs = overlap("name", 2, false).block(&left, &right);
        assert_eq!(ids(&pairs), vec![("a1", "b1")]);

        let pairs = overlap("name", 1, false).block(&left, &right);
        assert_eq!(ids(&pairs), vec![("a1", "b1"), ("a2", "b2")]);
    }

    #[test]
    fn allow_missing_pairs_blank_records_with_everything() {
        let (left, right) = tables();
        let pairs = overlap("name", 2, true).block(&left, &right);
        assert_eq!(
            ids(&pairs),
            vec![("a1", "b1"), ("a3", "b1"), ("a3", "b2"), ("a3", "b3")]
        );
    }

    #[test]
    fn two_stage_filters_first_stage() {
        let (left, right) = tables();
        let blocker = TwoStage {
            first: overlap("city", 1, false),
            second: overlap("name", 1, false),
        };
        let pairs = blocker.block(&left, &right);
        assert_eq!(ids(&pairs), vec![("a1", "b1"), ("a2", "b2")]);
    }

    #[test]
    fn self_join_excludes_diagonal() {
        let (left, _) = tables();
        let pairs = overlap("city", 1, false).block_self(&left);
        assert_eq!(ids(&pairs), vec![("a1", "a3"), ("a3", "a1")]);
    }

    #[test]
    fn registry_resolves_known_ids_only() {
        let mut rules = BTreeMap::new();
        rules.insert("fodors_zagats".to_string(), BlockingRule::CrossProduct);
        let registry = BlockerRegistry::from_rules(&rules);
        assert!(registry.get("fodors_zagats").is_ok());
        let err = registry.get("beer").err().unwrap();
        assert_eq!(err.kind(), "config_validation");
        assert!(err.to_string().contains("fodors_zagats"));
    }
}
