//! Reconcile cross-table decisions with within-table duplicate groups.
//!
//! Self-join posteriors above the match threshold link records of one table
//! into equivalence classes (union-find). Every cross-table row `(l, r)` is then
//! keyed by `(class(l), class(r))` and all rows sharing a key take the highest
//! posterior in the key group: if any member of a duplicate group matches a
//! record on the other side, every member does.

use std::collections::HashMap;

use tracing::info;

use crate::error::ZeroerError;
use crate::model::{FeatureSchema, LabelVector, PairTable};

/// Shared basis for the three matrices: sorted intersection of their columns.
pub fn align_schemas(
    main: &FeatureSchema,
    left: &FeatureSchema,
    right: &FeatureSchema,
) -> Result<FeatureSchema, ZeroerError> {
    let common = FeatureSchema::intersect([main, left, right]);
    if common.is_empty() {
        return Err(ZeroerError::InconsistentFeatureSet {
            main: main.names().to_vec(),
            left: left.names().to_vec(),
            right: right.names().to_vec(),
        });
    }
    let dropped = main.len() - common.len();
    info!(
        features = common.len(),
        dropped_from_main = dropped,
        "shared feature schema for transitivity"
    );
    Ok(common)
}

// ---------------------------------------------------------------------------
// Equivalence classes
// ---------------------------------------------------------------------------

/// Record id -> canonical id of its duplicate group, for one table.
///
/// Ids never linked to anything are their own class and are not stored.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceClasses {
    canonical: HashMap<String, String>,
    classes: usize,
}

impl EquivalenceClasses {
    /// Group ids whose self-join posterior exceeds `threshold`.
    pub fn from_self_join(pairs: &PairTable, posteriors: &LabelVector, threshold: f64) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut ids: Vec<&str> = Vec::new();
        let mut sets = DisjointSets::default();

        for (pair, &p) in pairs.iter().zip(posteriors.as_slice()) {
            if p <= threshold || pair.is_diagonal() {
                continue;
            }
            let a = intern(&pair.left_id, &mut index, &mut ids, &mut sets);
            let b = intern(&pair.right_id, &mut index, &mut ids, &mut sets);
            sets.union(a, b);
        }

        // Canonical id: the smallest id in the group, so output never depends on row order.
        let mut smallest: HashMap<usize, &str> = HashMap::new();
        for i in 0..ids.len() {
            let root = sets.find(i);
            let entry = smallest.entry(root).or_insert(ids[i]);
            if ids[i] < *entry {
                *entry = ids[i];
            }
        }

        let mut canonical = HashMap::with_capacity(ids.len());
        for i in 0..ids.len() {
            let root = sets.find(i);
            canonical.insert(ids[i].to_string(), smallest[&root].to_string());
        }

        Self {
            canonical,
            classes: smallest.len(),
        }
    }

    /// Canonical id for `id` (itself when it has no duplicates).
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.canonical.get(id).map(String::as_str).unwrap_or(id)
    }

    pub fn same_class(&self, a: &str, b: &str) -> bool {
        self.label(a) == self.label(b)
    }

    /// Number of groups with two or more members.
    pub fn class_count(&self) -> usize {
        self.classes
    }
}

fn intern<'a>(
    id: &'a str,
    index: &mut HashMap<&'a str, usize>,
    ids: &mut Vec<&'a str>,
    sets: &mut DisjointSets,
) -> usize {
    *index.entry(id).or_insert_with(|| {
        ids.push(id);
        sets.push()
    })
}

/// Union-find with union by size and path halving. Depth stays logarithmic,
/// and `find` never recurses.
#[derive(Debug, Default)]
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn push(&mut self) -> usize {
        let i = self.parent.len();
        self.parent.push(i);
        self.size.push(1);
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, i: usize, j: usize) {
        let (mut a, mut b) = (self.find(i), self.find(j));
        if a == b {
            return;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Unify cross-table posteriors per (left class, right class).
/// Returns the new posteriors and how many rows changed.
pub fn reconcile(
    pairs: &PairTable,
    posteriors: &LabelVector,
    left: &EquivalenceClasses,
    right: &EquivalenceClasses,
) -> (LabelVector, usize) {
    let mut best: HashMap<(&str, &str), f64> = HashMap::new();
    for (pair, &p) in pairs.iter().zip(posteriors.as_slice()) {
        let key = (left.label(&pair.left_id), right.label(&pair.right_id));
        let entry = best.entry(key).or_insert(p);
        if p > *entry {
            *entry = p;
        }
    }

    let mut adjusted = 0;
    let unified: Vec<f64> = pairs
        .iter()
        .zip(posteriors.as_slice())
        .map(|(pair, &p)| {
            let q = best[&(left.label(&pair.left_id), right.label(&pair.right_id))];
            if q != p {
                adjusted += 1;
            }
            q
        })
        .collect();

    (LabelVector::new(unified), adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandidatePair;

    fn table(pairs: &[(&str, &str)]) -> PairTable {
        PairTable::new(pairs.iter().map(|(l, r)| CandidatePair::new(*l, *r)).collect())
    }

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn align_intersects_and_sorts() {
        let s = align_schemas(
            &schema(&["title", "year", "authors"]),
            &schema(&["authors", "title"]),
            &schema(&["title", "venue", "authors"]),
        )
        .unwrap();
        assert_eq!(s.names(), &["authors".to_string(), "title".to_string()]);
    }

    #[test]
    fn align_rejects_empty_intersection() {
        let err = align_schemas(&schema(&["a"]), &schema(&["b"]), &schema(&["a"])).unwrap_err();
        assert_eq!(err.kind(), "inconsistent_feature_set");
    }

    #[test]
    fn classes_follow_transitive_links() {
        let pairs = table(&[("a1", "a2"), ("a2", "a3"), ("a4", "a5"), ("a1", "a4")]);
        let post = LabelVector::new(vec![0.9, 0.8, 0.7, 0.1]);
        let classes = EquivalenceClasses::from_self_join(&pairs, &post, 0.5);
        assert!(classes.same_class("a1", "a3"));
        assert!(classes.same_class("a4", "a5"));
        assert!(!classes.same_class("a1", "a4"));
        assert_eq!(classes.class_count(), 2);
        assert_eq!(classes.label("a3"), "a1");
        assert_eq!(classes.label("zz"), "zz");
    }

    #[test]
    fn long_chain_forms_one_class() {
        let n = 300_000;
        let ids: Vec<String> = (0..=n).map(|i| format!("a{i:06}")).collect();
        let pairs = PairTable::new(
            ids.windows(2)
                .map(|w| CandidatePair::new(w[0].as_str(), w[1].as_str()))
                .collect(),
        );
        let post = LabelVector::new(vec![0.99; n]);
        let classes = EquivalenceClasses::from_self_join(&pairs, &post, 0.5);
        assert_eq!(classes.class_count(), 1);
        assert_eq!(classes.label(&ids[n]), "a000000");
        assert!(classes.same_class(&ids[0], &ids[n / 2]));
    }

    #[test]
    fn disjoint_sets_keep_trees_shallow() {
        let mut sets = DisjointSets::default();
        for _ in 0..1024 {
            sets.push();
        }
        for i in 1..1024 {
            sets.union(i - 1, i);
        }
        let root = sets.find(0);
        let mut depth = 0;
        let mut i = 1023;
        while sets.parent[i] != i {
            i = sets.parent[i];
            depth += 1;
        }
        assert_eq!(i, root);
        assert!(depth <= 10, "depth = {depth}");
    }

    #[test]
    fn diagonal_rows_do_not_link() {
        let pairs = table(&[("a1", "a1")]);
        let post = LabelVector::new(vec![1.0]);
        let classes = EquivalenceClasses::from_self_join(&pairs, &post, 0.5);
        assert_eq!(classes.class_count(), 0);
    }

    #[test]
    fn reconcile_unifies_duplicate_group() {
        // a1 ~ a2 on the left; no right duplicates.
        let left = EquivalenceClasses::from_self_join(
            &table(&[("a1", "a2")]),
            &LabelVector::new(vec![0.95]),
            0.5,
        );
        let right = EquivalenceClasses::default();

        let cross = table(&[("a1", "b1"), ("a2", "b1"), ("a3", "b1"), ("a2", "b2")]);
        let post = LabelVector::new(vec![0.97, 0.2, 0.4, 0.1]);
        let (out, adjusted) = reconcile(&cross, &post, &left, &right);
        assert_eq!(out.as_slice(), &[0.97, 0.97, 0.4, 0.1]);
        assert_eq!(adjusted, 1);
    }

    #[test]
    fn reconcile_uses_both_sides() {
        let left = EquivalenceClasses::from_self_join(
            &table(&[("a1", "a2")]),
            &LabelVector::new(vec![0.9]),
            0.5,
        );
        let right = EquivalenceClasses::from_self_join(
            &table(&[("b1", "b2")]),
            &LabelVector::new(vec![0.9]),
            0.5,
        );
        let cross = table(&[("a1", "b2"), ("a2", "b1"), ("a2", "b2")]);
        let post = LabelVector::new(vec![0.1, 0.8, 0.3]);
        let (out, _) = reconcile(&cross, &post, &left, &right);
        assert_eq!(out.as_slice(), &[0.8, 0.8, 0.8]);
    }
}
