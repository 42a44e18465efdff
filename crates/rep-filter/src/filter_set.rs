//! The mutable, per-`stream_id` filter set.
//!
//! Modeled as a plain add-set with idempotent membership, collapsing the
//! cluster-wide CRDT map described in spec.md §5/§9 to an in-memory
//! `HashSet` for single-node deployments — propagation to other nodes is
//! an external collaborator's concern (a replicated keyed map), not this
//! engine's.

use crate::criteria::{CriterionKind, FilterCriteria};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct FilterSet {
    excludes: HashSet<CriterionKind>,
    includes: HashSet<CriterionKind>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one `Add`/`Remove` operation. Adding an already-present
    /// criterion, or removing an absent one, is a no-op (spec.md §4.3).
    pub fn apply(&mut self, op: FilterCriteria) {
        match op {
            FilterCriteria::Add(kind) => {
                if kind.is_exclude() {
                    self.excludes.insert(kind);
                } else {
                    self.includes.insert(kind);
                }
            }
            FilterCriteria::Remove(kind) => {
                if kind.is_exclude() {
                    self.excludes.remove(&kind);
                } else {
                    self.includes.remove(&kind);
                }
            }
        }
    }

    /// Applies a batch of operations. Applying the same batch twice has
    /// the same effect as applying it once (spec.md §8, invariant 7),
    /// which falls out directly from set insert/remove being idempotent.
    pub fn apply_batch(&mut self, ops: impl IntoIterator<Item = FilterCriteria>) {
        for op in ops {
            self.apply(op);
        }
    }

    pub fn excludes(&self) -> impl Iterator<Item = &CriterionKind> {
        self.excludes.iter()
    }

    pub fn includes(&self) -> impl Iterator<Item = &CriterionKind> {
        self.includes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tags(labels: &[&str]) -> CriterionKind {
        CriterionKind::ExcludeTags(labels.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>())
    }

    #[test]
    fn adding_same_criterion_twice_is_a_noop() {
        let mut set = FilterSet::new();
        set.apply(FilterCriteria::Add(tags(&["small"])));
        set.apply(FilterCriteria::Add(tags(&["small"])));
        assert_eq!(set.excludes().count(), 1);
    }

    #[test]
    fn removing_absent_criterion_is_a_noop() {
        let mut set = FilterSet::new();
        set.apply(FilterCriteria::Remove(tags(&["small"])));
        assert_eq!(set.excludes().count(), 0);
    }

    #[test]
    fn remove_matches_by_value_equality_on_original_add() {
        let mut set = FilterSet::new();
        set.apply(FilterCriteria::Add(tags(&["small"])));
        set.apply(FilterCriteria::Remove(tags(&["small"])));
        assert_eq!(set.excludes().count(), 0);
    }

    #[test]
    fn applying_batch_twice_matches_applying_once() {
        let ops = vec![FilterCriteria::Add(tags(&["small"])), FilterCriteria::Add(tags(&["large"]))];
        let mut a = FilterSet::new();
        a.apply_batch(ops.clone());
        let mut b = FilterSet::new();
        b.apply_batch(ops.clone());
        b.apply_batch(ops);
        assert_eq!(a.excludes().count(), b.excludes().count());
    }
}
