//! The filter engine: per-envelope evaluation of the static producer
//! filter and the dynamic, mutable consumer filter. See spec.md §4.3.

pub mod criteria;
pub mod engine;
pub mod filter_set;
pub mod matching;

pub use criteria::{CriterionKind, EntityIdCriterion, FilterCriteria};
pub use engine::{evaluate, replay_floor_for, Decision};
pub use filter_set::FilterSet;
pub use matching::RegexCache;

/// A static, producer-configured predicate (spec.md §4.2, step 1).
///
/// Unlike the consumer filter, this is a plain function: producer-side
/// suppression is permanent and configured once at startup, not mutated
/// over the wire.
pub type ProducerFilter = std::sync::Arc<dyn Fn(&rep_core::EventEnvelope) -> bool + Send + Sync>;

/// A producer filter that admits everything.
pub fn allow_all() -> ProducerFilter {
    std::sync::Arc::new(|_| true)
}
