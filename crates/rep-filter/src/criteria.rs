//! `FilterCriteria`: one tagged rule in the dynamic consumer filter, per
//! spec.md §3 and §4.3.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One matching rule. Equality is by value, which is what makes `Remove`
/// operate "by value equality on the original Add" (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriterionKind {
    ExcludeTags(BTreeSet<String>),
    IncludeTags(BTreeSet<String>),
    ExcludeEntityIds(BTreeSet<String>),
    IncludeEntityIds(Vec<EntityIdCriterion>),
    ExcludeRegexEntityIds(Vec<String>),
    IncludeRegexEntityIds(Vec<String>),
}

/// A literal entity-id match, optionally carrying a replay floor.
///
/// `IncludeEntityIds` may carry a per-entity `seq_nr` replay floor,
/// interpreted by the producer's replay path (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityIdCriterion {
    pub persistence_id: String,
    pub seq_nr: Option<i64>,
}

// `seq_nr` is a replay instruction, not part of the criterion's identity —
// two `IncludeEntityIds` batches naming the same ids are the same criterion
// regardless of which replay floors they happen to carry, consistent with
// "Remove operates by value equality on the original Add" on the id set.
impl PartialEq for EntityIdCriterion {
    fn eq(&self, other: &Self) -> bool {
        self.persistence_id == other.persistence_id
    }
}
impl Eq for EntityIdCriterion {}
impl std::hash::Hash for EntityIdCriterion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.persistence_id.hash(state);
    }
}

/// One incremental update to a stream's filter set: add or remove a
/// criterion, per spec.md §4.2 ("Filter{criteria[]} mutates the active
/// filter set incrementally (Add or Remove per criterion)").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterCriteria {
    Add(CriterionKind),
    Remove(CriterionKind),
}

impl CriterionKind {
    pub fn is_exclude(&self) -> bool {
        matches!(
            self,
            CriterionKind::ExcludeTags(_)
                | CriterionKind::ExcludeEntityIds(_)
                | CriterionKind::ExcludeRegexEntityIds(_)
        )
    }
}
