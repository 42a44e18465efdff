//! Per-envelope filter evaluation, matching spec.md §4.3's evaluation
//! order exactly.

use crate::criteria::CriterionKind;
use crate::filter_set::FilterSet;
use crate::matching::{matches, RegexCache};
use rep_core::EventEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No `Exclude*` matched, or one matched but a later `Include*` re-included it.
    Emit,
    /// An `Exclude*` matched and no `Include*` re-included it.
    Suppress,
}

/// Evaluates the consumer filter for one envelope, per spec.md §4.3:
///
/// 1. If any `Exclude*` criterion matches, tentatively suppress.
/// 2. If suppressed, evaluate `Include*`; any match re-includes.
/// 3. If no `Exclude*` matched at all, emit.
pub fn evaluate(filter: &FilterSet, env: &EventEnvelope, regex_cache: &mut RegexCache) -> Decision {
    let excluded = filter.excludes().any(|c| matches(c, env, regex_cache));
    if !excluded {
        return Decision::Emit;
    }
    let re_included = filter.includes().any(|c| matches(c, env, regex_cache));
    if re_included {
        Decision::Emit
    } else {
        Decision::Suppress
    }
}

/// Looks up the replay floor (`seq_nr`) an `IncludeEntityIds` criterion
/// carries for `persistence_id`, if any (spec.md §4.3).
pub fn replay_floor_for(filter: &FilterSet, persistence_id: &str) -> Option<i64> {
    filter.includes().find_map(|c| match c {
        CriterionKind::IncludeEntityIds(ids) => ids
            .iter()
            .find(|id| id.persistence_id == persistence_id)
            .and_then(|id| id.seq_nr),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{EntityIdCriterion, FilterCriteria};
    use rep_core::{Payload, TimestampOffset};
    use std::collections::BTreeSet;

    fn env(pid: &str, tags: &[&str]) -> EventEnvelope {
        EventEnvelope {
            persistence_id: pid.to_owned(),
            seq_nr: 7,
            slice: rep_core::slice_of(pid),
            offset: TimestampOffset::new(1),
            payload: Payload::new("type.googleapis.com/demo.Widget", vec![]),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            source: "test".to_owned(),
            metadata: None,
            is_backtrack: false,
        }
    }

    fn tag_set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_exclude_match_emits() {
        let filter = FilterSet::new();
        let mut cache = RegexCache::new();
        assert_eq!(evaluate(&filter, &env("b", &["small"]), &mut cache), Decision::Emit);
    }

    #[test]
    fn exclude_match_with_no_include_suppresses() {
        let mut filter = FilterSet::new();
        filter.apply(FilterCriteria::Add(CriterionKind::ExcludeTags(tag_set(&["small"]))));
        let mut cache = RegexCache::new();
        assert_eq!(evaluate(&filter, &env("b", &["small"]), &mut cache), Decision::Suppress);
    }

    #[test]
    fn exclude_match_re_included_emits() {
        // Scenario 4 from spec.md §8: ExcludeTags{"small"} then IncludeTags{"large"},
        // event tagged {"small","large"} -> emitted as Event.
        let mut filter = FilterSet::new();
        filter.apply(FilterCriteria::Add(CriterionKind::ExcludeTags(tag_set(&["small"]))));
        filter.apply(FilterCriteria::Add(CriterionKind::IncludeTags(tag_set(&["large"]))));
        let mut cache = RegexCache::new();
        assert_eq!(
            evaluate(&filter, &env("b", &["small", "large"]), &mut cache),
            Decision::Emit
        );
    }

    #[test]
    fn scenario_5_exclude_without_matching_include_suppresses() {
        let mut filter = FilterSet::new();
        filter.apply(FilterCriteria::Add(CriterionKind::ExcludeTags(tag_set(&["small"]))));
        let mut cache = RegexCache::new();
        assert_eq!(evaluate(&filter, &env("b", &["small"]), &mut cache), Decision::Suppress);
    }

    #[test]
    fn replay_floor_is_looked_up_by_persistence_id() {
        let mut filter = FilterSet::new();
        filter.apply(FilterCriteria::Add(CriterionKind::IncludeEntityIds(vec![
            EntityIdCriterion { persistence_id: "a".into(), seq_nr: Some(5) },
        ])));
        assert_eq!(replay_floor_for(&filter, "a"), Some(5));
        assert_eq!(replay_floor_for(&filter, "b"), None);
    }
}
