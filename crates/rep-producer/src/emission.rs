//! The per-envelope emission rule. Pure and transport-agnostic — see
//! spec.md §4.2 "Emission rule".

use rep_core::{EventEnvelope, PayloadRegistry, UnknownPayloadType};
use rep_filter::{Decision, FilterSet, ProducerFilter, RegexCache};
use rep_protocol::{Event, FilteredEvent, StreamOut};

/// Runs one envelope through the four emission steps in order:
///
/// 1. Static producer filter. Rejected envelopes vanish silently — the
///    consumer absorbs the resulting `seq_nr` gap.
/// 2. Backtracking envelopes are dropped (documented omission, spec.md §9).
/// 3. Dynamic consumer filter (spec.md §4.3).
/// 4. Serialize to the wire `Event`/`FilteredEvent` variant, after
///    checking the payload's `type_url` against `registry` (spec.md §9
///    "Serialization fallback"). `registry` of `None` means no registry
///    is configured for this producer and every `type_url` is accepted —
///    see [`rep_core::PayloadRegistry`].
///
/// Returns `Ok(None)` when the envelope produces no wire message at all
/// (steps 1 and 2); `Err` when step 4's registry check rejects an
/// unregistered `type_url`, which the caller should treat as fatal for
/// the stream rather than silently dropping the event.
pub fn emit(
    producer_filter: &ProducerFilter,
    consumer_filter: &FilterSet,
    regex_cache: &mut RegexCache,
    registry: Option<&dyn PayloadRegistry>,
    env: &EventEnvelope,
) -> Result<Option<StreamOut>, UnknownPayloadType> {
    if !producer_filter(env) {
        return Ok(None);
    }
    if env.is_backtrack {
        tracing::debug!(persistence_id = %env.persistence_id, seq_nr = env.seq_nr, "dropping backtracking envelope");
        return Ok(None);
    }
    match rep_filter::evaluate(consumer_filter, env, regex_cache) {
        Decision::Emit => {
            if let Some(registry) = registry {
                registry.require(&env.payload.type_url)?;
            }
            Ok(Some(StreamOut::Event(Event {
                persistence_id: env.persistence_id.clone(),
                seq_nr: env.seq_nr,
                slice: env.slice,
                offset: env.offset.clone(),
                payload: env.payload.clone(),
                source: env.source.clone(),
                metadata: env.metadata.clone(),
                tags: env.tags.iter().cloned().collect(),
            })))
        }
        Decision::Suppress => Ok(Some(StreamOut::FilteredEvent(FilteredEvent {
            persistence_id: env.persistence_id.clone(),
            seq_nr: env.seq_nr,
            slice: env.slice,
            offset: env.offset.clone(),
            source: env.source.clone(),
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rep_core::{Payload, StaticPayloadRegistry, TimestampOffset};
    use rep_filter::CriterionKind;
    use std::collections::BTreeSet;

    fn env(pid: &str, tags: &[&str], is_backtrack: bool) -> EventEnvelope {
        EventEnvelope {
            persistence_id: pid.to_owned(),
            seq_nr: 7,
            slice: rep_core::slice_of(pid),
            offset: TimestampOffset::new(1),
            payload: Payload::new("type.googleapis.com/demo.Widget", vec![1, 2, 3]),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            source: "test".to_owned(),
            metadata: None,
            is_backtrack,
        }
    }

    #[test]
    fn producer_filter_rejection_emits_nothing() {
        let producer_filter: ProducerFilter = std::sync::Arc::new(|_| false);
        let consumer_filter = FilterSet::new();
        let mut cache = RegexCache::new();
        assert!(emit(&producer_filter, &consumer_filter, &mut cache, None, &env("b", &[], false)).unwrap().is_none());
    }

    #[test]
    fn backtracking_envelope_is_dropped() {
        let producer_filter = rep_filter::allow_all();
        let consumer_filter = FilterSet::new();
        let mut cache = RegexCache::new();
        assert!(emit(&producer_filter, &consumer_filter, &mut cache, None, &env("b", &[], true)).unwrap().is_none());
    }

    #[test]
    fn scenario_5_suppressed_envelope_becomes_filtered_event() {
        let producer_filter = rep_filter::allow_all();
        let mut consumer_filter = FilterSet::new();
        consumer_filter.apply(rep_filter::FilterCriteria::Add(CriterionKind::ExcludeTags(
            BTreeSet::from(["small".to_owned()]),
        )));
        let mut cache = RegexCache::new();
        let out = emit(&producer_filter, &consumer_filter, &mut cache, None, &env("b", &["small"], false))
            .unwrap()
            .unwrap();
        assert!(matches!(out, StreamOut::FilteredEvent(FilteredEvent { seq_nr: 7, .. })));
    }

    #[test]
    fn unsuppressed_envelope_becomes_event_with_payload() {
        let producer_filter = rep_filter::allow_all();
        let consumer_filter = FilterSet::new();
        let mut cache = RegexCache::new();
        let out = emit(&producer_filter, &consumer_filter, &mut cache, None, &env("b", &["large"], false))
            .unwrap()
            .unwrap();
        match out {
            StreamOut::Event(e) => assert_eq!(e.payload.bytes, vec![1, 2, 3]),
            StreamOut::FilteredEvent(_) => panic!("expected Event"),
        }
    }

    #[test]
    fn unregistered_type_url_fails_fast_when_a_registry_is_configured() {
        let producer_filter = rep_filter::allow_all();
        let consumer_filter = FilterSet::new();
        let mut cache = RegexCache::new();
        let registry = StaticPayloadRegistry::new(["type.googleapis.com/demo.Gadget"]);
        let err = emit(&producer_filter, &consumer_filter, &mut cache, Some(&registry), &env("b", &[], false))
            .unwrap_err();
        assert_eq!(err.0, "type.googleapis.com/demo.Widget");
    }

    #[test]
    fn registered_type_url_passes_the_registry_check() {
        let producer_filter = rep_filter::allow_all();
        let consumer_filter = FilterSet::new();
        let mut cache = RegexCache::new();
        let registry = StaticPayloadRegistry::new(["type.googleapis.com/demo.Widget"]);
        let out = emit(&producer_filter, &consumer_filter, &mut cache, Some(&registry), &env("b", &[], false))
            .unwrap()
            .unwrap();
        assert!(matches!(out, StreamOut::Event(_)));
    }
}
